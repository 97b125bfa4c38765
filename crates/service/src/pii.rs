//! Sealing and opening of PII fields.
//!
//! Services seal contact data and notes through [`FieldProtector`] before it
//! reaches a repository. [`DecryptionService`] is the only path back to
//! plaintext; it logs which field of which record was opened, never the value.

use std::sync::Arc;

use common::crypto::{CipherError, FieldCipher};
use tracing::{debug, info, warn};

use crate::errors::ServiceError;

#[derive(Clone, Debug)]
pub struct FieldProtector {
    cipher: Arc<FieldCipher>,
}

impl FieldProtector {
    pub fn new(cipher: Arc<FieldCipher>) -> Self { Self { cipher } }

    pub fn seal(&self, field: &'static str, plaintext: &str) -> Result<String, ServiceError> {
        self.cipher.seal(plaintext).map_err(|e| {
            debug!(field, "pii_seal_failed");
            ServiceError::from(e)
        })
    }

    pub fn seal_opt(&self, field: &'static str, plaintext: Option<&str>) -> Result<Option<String>, ServiceError> {
        plaintext
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| self.seal(field, v))
            .transpose()
    }
}

#[derive(Clone, Debug)]
pub struct DecryptionService {
    cipher: Arc<FieldCipher>,
}

impl DecryptionService {
    pub fn new(cipher: Arc<FieldCipher>) -> Self { Self { cipher } }

    pub fn decrypt(&self, field: &'static str, entity_id: &str, sealed: &str) -> Result<String, ServiceError> {
        match self.cipher.open(sealed) {
            Ok(plain) => {
                info!(field, entity_id, "pii_decrypted");
                Ok(plain)
            }
            Err(e) => {
                warn!(field, entity_id, error = %e, "pii_decrypt_failed");
                Err(ServiceError::Crypto(e))
            }
        }
    }

    pub fn decrypt_opt(&self, field: &'static str, entity_id: &str, sealed: Option<&str>) -> Result<Option<String>, ServiceError> {
        sealed.map(|s| self.decrypt(field, entity_id, s)).transpose()
    }
}

/// Build the sealing and opening halves from one configured key.
pub fn from_key(encoded_key: &str) -> Result<(FieldProtector, DecryptionService), CipherError> {
    let cipher = Arc::new(FieldCipher::from_base64_key(encoded_key)?);
    Ok((FieldProtector::new(cipher.clone()), DecryptionService::new(cipher)))
}
