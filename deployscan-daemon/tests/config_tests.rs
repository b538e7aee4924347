//! Configuration loading tests for the daemon entry point.

use std::io::Write;

use clap::Parser;
use deployscan_daemon::cli::DaemonCli;
use deployscan_daemon::wiring::{load_config, validate_components};
use serial_test::serial;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn cli(path: &std::path::Path, extra: &[&str]) -> DaemonCli {
    let mut args = vec!["deployscan-daemon", "-c", path.to_str().unwrap()];
    args.extend_from_slice(extra);
    DaemonCli::try_parse_from(args).unwrap()
}

#[tokio::test]
#[serial]
async fn loads_file_and_applies_cli_overrides() {
    let file = write_config(
        r#"
[general]
log_level = "warn"
log_format = "json"

[scanner]
image = "registry.example.com/scanner:2"
timeout_secs = 600

[storage]
backend = "sqlite"
path = "/tmp/deployscan-test"

[alert]
severity_threshold = "critical"
"#,
    );

    let config = load_config(&cli(file.path(), &["--log-format", "pretty", "--backend", "memory"]))
        .await
        .unwrap();
    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.storage.backend, "memory");
    assert_eq!(config.scanner.timeout_secs, 600);
    assert!(validate_components(&config).is_ok());
}

#[tokio::test]
#[serial]
async fn environment_overrides_file() {
    let file = write_config("[cache]\nwindow_hours = 12\n");

    // SAFETY: serialized test, no other thread reads the environment
    unsafe { std::env::set_var("DEPLOYSCAN_CACHE_WINDOW_HOURS", "48") };
    let config = load_config(&cli(file.path(), &[])).await;
    unsafe { std::env::remove_var("DEPLOYSCAN_CACHE_WINDOW_HOURS") };

    assert_eq!(config.unwrap().cache.window_hours, 48);
}

#[tokio::test]
#[serial]
async fn invalid_cli_override_fails_validation() {
    let file = write_config("");
    let result = load_config(&cli(file.path(), &["--log-format", "xml"])).await;
    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn missing_file_is_an_error() {
    let result = load_config(&cli(std::path::Path::new("/nonexistent/deployscan.toml"), &[])).await;
    let err = result.unwrap_err().to_string();
    assert!(err.contains("failed to load config"));
}
