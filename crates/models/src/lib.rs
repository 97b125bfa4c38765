//! Model layer: entity declarations with their field constraints, and the
//! named data-access operations the service layer composes.
//!
//! Query builders (`*_query`) perform no I/O and can be inspected directly;
//! the executing functions take a connection and return `ModelError`.

pub mod errors;
pub mod db;
pub mod schema;
pub mod pagination;
pub mod coach;
pub mod client;
pub mod coaching_session;
pub mod audit_log;
pub mod scheduled_job;

#[cfg(test)]
mod tests;
