//! Create `client` table.
//! Contact fields hold sealed ciphertext, never plaintext.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Client::Table)
                    .if_not_exists()
                    .col(uuid(Client::Id).primary_key())
                    .col(uuid(Client::CoachId).not_null())
                    .col(string_len(Client::DisplayName, 128).not_null())
                    .col(text(Client::EmailEncrypted).not_null())
                    .col(text_null(Client::PhoneEncrypted))
                    .col(string_len(Client::Status, 16).not_null().default("active"))
                    .col(timestamp_with_time_zone(Client::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Client::UpdatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_client_coach")
                            .from(Client::Table, Client::CoachId)
                            .to(Coach::Table, Coach::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Client::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Client {
    Table,
    Id,
    CoachId,
    DisplayName,
    EmailEncrypted,
    PhoneEncrypted,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Coach { Table, Id }
