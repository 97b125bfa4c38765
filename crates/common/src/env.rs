//! Startup sanity checks.

use tracing::warn;

/// Check that the planning source root is a readable directory. A missing
/// root is not fatal; research just comes back empty. Returns whether the
/// root is usable.
pub async fn ensure_env(plan_source_root: &str) -> bool {
    match tokio::fs::metadata(plan_source_root).await {
        Ok(meta) if meta.is_dir() => true,
        Ok(_) => {
            warn!(%plan_source_root, "planning source root is not a directory; plan research will be empty");
            false
        }
        Err(e) => {
            warn!(%plan_source_root, error = %e, "planning source root not found; plan research will be empty");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_root_is_reported_without_creating_anything() {
        let dir = std::env::temp_dir().join(format!("coachdesk_env_{}", std::process::id()));
        assert!(!ensure_env(dir.to_str().unwrap_or_default()).await);
        assert!(tokio::fs::metadata(&dir).await.is_err());
    }

    #[tokio::test]
    async fn existing_directory_is_usable() {
        assert!(ensure_env(env!("CARGO_MANIFEST_DIR")).await);
        assert!(!ensure_env(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml")).await);
    }
}
