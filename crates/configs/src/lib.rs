use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Hard ceiling on any page size, regardless of configuration.
pub const MAX_PAGE_SIZE_CAP: u64 = 100;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, worker_threads: Some(4) }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            acquire_timeout_secs: default_acquire_timeout(),
            sqlx_logging: false,
        }
    }
}

fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 30 }
fn default_idle_timeout() -> u64 { 600 }
fn default_max_lifetime() -> u64 { 3600 }
fn default_acquire_timeout() -> u64 { 30 }

/// Request-shaping limits applied by the service layer.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_page_size_cap")]
    pub page_size_cap: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_dashboard_coaches")]
    pub max_dashboard_coaches: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            page_size_cap: default_page_size_cap(),
            max_concurrency: default_max_concurrency(),
            max_dashboard_coaches: default_max_dashboard_coaches(),
        }
    }
}

fn default_page_size_cap() -> u64 { MAX_PAGE_SIZE_CAP }
fn default_max_concurrency() -> usize { 4 }
fn default_max_dashboard_coaches() -> usize { 50 }

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    /// Base64 of a 32-byte key. Falls back to `PII_ENCRYPTION_KEY`.
    #[serde(default)]
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self { Self { format: default_log_format() } }
}

fn default_log_format() -> String { "compact".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct PlanningConfig {
    #[serde(default = "default_source_root")]
    pub source_root: String,
    #[serde(default = "default_max_scan_files")]
    pub max_scan_files: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self { source_root: default_source_root(), max_scan_files: default_max_scan_files() }
    }
}

fn default_source_root() -> String { "crates".into() }
fn default_max_scan_files() -> usize { 500 }

fn config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

/// Like [`load_from_file`], but an absent file yields defaults. Unreadable or
/// malformed files are still errors.
pub fn load_or_default_from(path: &str) -> Result<AppConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse(&content).with_context(|| format!("parsing {path}")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("reading {path}"))),
    }
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load from file when present, otherwise start from defaults plus env.
    pub fn load_or_env() -> Result<Self> {
        let mut cfg = load_or_default_from(&config_path())?;
        cfg.server.apply_env();
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.database.normalize_from_env();
        self.database.validate()?;
        self.limits.validate()?;
        self.security.normalize_from_env();
        self.security.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("SERVER_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }
        if let Some(w) = std::env::var("TOKIO_WORKER_THREADS").ok().and_then(|v| v.parse::<usize>().ok()) {
            self.worker_threads = Some(w);
        }
    }

    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be within 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn normalize_from_env(&mut self) {
        if self.url.trim().is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("database.url is empty; set it in config.toml or DATABASE_URL"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("postgresql://") || lower.starts_with("postgres://")) {
            return Err(anyhow!("database.url must start with postgresql:// or postgres://"));
        }
        if self.min_connections == 0 {
            return Err(anyhow!("database.min_connections must be >= 1"));
        }
        if self.max_connections < self.min_connections {
            return Err(anyhow!("database.max_connections must be >= min_connections"));
        }
        if self.connect_timeout_secs == 0 || self.acquire_timeout_secs == 0 {
            return Err(anyhow!("database timeouts must be positive seconds"));
        }
        Ok(())
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size_cap == 0 || self.page_size_cap > MAX_PAGE_SIZE_CAP {
            return Err(anyhow!("limits.page_size_cap must be within 1..={MAX_PAGE_SIZE_CAP}"));
        }
        if self.max_concurrency == 0 {
            return Err(anyhow!("limits.max_concurrency must be >= 1"));
        }
        if self.max_dashboard_coaches == 0 {
            return Err(anyhow!("limits.max_dashboard_coaches must be >= 1"));
        }
        Ok(())
    }
}

impl SecurityConfig {
    pub fn normalize_from_env(&mut self) {
        if self.encryption_key.trim().is_empty() {
            if let Ok(key) = std::env::var("PII_ENCRYPTION_KEY") {
                self.encryption_key = key;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.encryption_key.trim().is_empty() {
            return Err(anyhow!("security.encryption_key is empty; set it in config.toml or PII_ENCRYPTION_KEY"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [server]
        host = "0.0.0.0"
        port = 9000
        worker_threads = 0

        [database]
        url = "postgres://coach:pw@localhost:5432/coachdesk"

        [limits]
        page_size_cap = 50
        max_concurrency = 8

        [security]
        encryption_key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
    "#;

    #[test]
    fn parses_and_normalizes_full_file() {
        let mut cfg = parse(FULL).unwrap();
        cfg.normalize_and_validate().unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.worker_threads, Some(4));
        assert_eq!(cfg.limits.page_size_cap, 50);
        assert_eq!(cfg.limits.max_concurrency, 8);
        assert_eq!(cfg.limits.max_dashboard_coaches, 50);
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.logging.format, "compact");
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.limits.page_size_cap, 100);
        assert_eq!(cfg.limits.max_concurrency, 4);
        assert_eq!(cfg.planning.source_root, "crates");
    }

    #[test]
    fn rejects_cap_above_hard_ceiling() {
        let limits = LimitsConfig { page_size_cap: 500, ..LimitsConfig::default() };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn rejects_non_postgres_url() {
        let db = DatabaseConfig { url: "mysql://x".into(), ..DatabaseConfig::default() };
        assert!(db.validate().is_err());
    }

    fn scratch_file(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("coachdesk-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn malformed_file_is_an_error_not_defaults() {
        let path = scratch_file("broken.toml", "[server\nport = \"eighty\"");
        let err = load_or_default_from(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("parsing"), "{err}");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn wrong_types_are_an_error() {
        let path = scratch_file("types.toml", "[limits]\npage_size_cap = \"lots\"\n");
        assert!(load_or_default_from(path.to_str().unwrap()).is_err());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("coachdesk-{}-absent.toml", std::process::id()));
        let cfg = load_or_default_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.limits.page_size_cap, 100);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let limits = LimitsConfig { max_concurrency: 0, ..LimitsConfig::default() };
        assert!(limits.validate().is_err());
    }
}
