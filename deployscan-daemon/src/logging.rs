//! Log output for the scan daemon.
//!
//! Logs go to stderr; stdout is reserved for the end-of-run summary line.
//! The configured level applies to the deployscan crates, while the
//! Docker, HTTP and SQLite client crates stay at `warn` so that every
//! poll of an execution unit does not flood the output.

use std::str::FromStr;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use deployscan_core::config::GeneralConfig;

/// Client crates capped at `warn` unless `RUST_LOG` says otherwise.
const QUIET_DEPENDENCIES: &[&str] = &["bollard", "hyper", "hyper_util", "h2", "sqlx"];

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One flattened JSON object per event, for log shippers.
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            )),
        }
    }
}

/// Filter directives derived from `general.log_level`.
pub fn filter_directives(level: &str) -> String {
    let mut directives = vec![level.to_owned()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|krate| format!("{krate}=warn")));
    directives.join(",")
}

/// Install the global subscriber. Call once, before the first scan.
///
/// `RUST_LOG` replaces the derived filter entirely.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format: LogFormat = config.log_format.parse()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(&config.log_level)))
        .map_err(|e| anyhow::anyhow!("invalid log level '{}': {}", config.log_level, e))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install {:?} log subscriber: {}", format, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats_case_insensitively() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        let err = "yaml".parse::<LogFormat>().unwrap_err();
        assert!(err.to_string().contains("'yaml'"));
    }

    #[test]
    fn directives_quiet_client_crates() {
        let directives = filter_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("bollard=warn"));
        assert!(directives.contains("sqlx=warn"));
        EnvFilter::try_new(&directives).unwrap();
    }

    #[test]
    fn unknown_format_fails_before_install() {
        let config = GeneralConfig {
            log_format: "xml".to_owned(),
            ..GeneralConfig::default()
        };
        assert!(init_tracing(&config).is_err());
    }
}
