//! Shared building blocks used by every layer of the coaching back-end:
//! logging setup, transport-neutral types, PII field encryption and
//! startup environment checks.

pub mod types;
pub mod crypto;
pub mod utils;
pub mod env;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_type_ok() {
        let h = types::Health { status: "ok" };
        assert_eq!(h.status, "ok");
    }
}
