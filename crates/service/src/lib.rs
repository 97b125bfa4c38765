//! Service layer: business operations composed over the model layer.
//! - Every operation takes an options bag and validates it before any
//!   repository call.
//! - Repositories are traits so tests run against in-memory doubles.
//! - PII is sealed on the way in and opened only by `DecryptionService`.

pub mod errors;
pub mod validate;
pub mod compose;
pub mod repository;
pub mod repo;
pub mod pii;
pub mod audit;
pub mod jobs;
pub mod services;
pub mod planning;
pub mod operations;
#[cfg(test)]
pub mod test_support;

pub use errors::ServiceError;
pub use services::{Limits, ServiceContext};
