use std::io;
use std::str::FromStr;

use tracing_subscriber::{fmt, EnvFilter};

/// Default directives when `RUST_LOG` is unset. sqlx statement logging is
/// kept at warn so bound parameters never reach the log.
const DEFAULT_DIRECTIVES: &str = "info,tower_http=info,axum=info,sqlx=warn";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other}")),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber on stdout. A second call is a no-op.
pub fn install(format: LogFormat) {
    let builder = fmt().with_env_filter(env_filter()).with_writer(io::stdout);
    let _ = match format {
        LogFormat::Compact => builder.with_target(false).compact().try_init(),
        LogFormat::Json => builder.with_target(true).json().try_init(),
    };
}

pub fn init_logging_default() {
    install(LogFormat::Compact);
}

/// Configured entry point; unknown formats fall back to compact.
pub fn init_logging(format: &str) {
    install(format.parse().unwrap_or(LogFormat::Compact));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_logging("json");
        init_logging_default();
    }
}
