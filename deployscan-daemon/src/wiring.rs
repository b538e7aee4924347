//! Component assembly -- configuration loading and handler wiring.
//!
//! Loads `deployscan.toml`, applies CLI overrides, derives each component's
//! runtime configuration, and assembles the production [`EventHandler`]:
//!
//! ```text
//! DeployscanConfig
//!   ├── ScanJobConfig --> DockerPlatform --> ScanJobOrchestrator
//!   ├── StoreConfig   --> Storage (sqlite | memory)
//!   └── IntakeConfig
//!                     --> EventHandler (EnvSecretStore, TracingSink, SystemClock)
//! ```

use std::sync::Arc;

use anyhow::Result;

use deployscan_core::clock::{Clock, SystemClock};
use deployscan_core::config::DeployscanConfig;
use deployscan_intake::{EventHandler, EventHandlerBuilder, IntakeConfig, TracingSink};
use deployscan_scan_job::{DockerPlatform, EnvSecretStore, ScanJobConfig, ScanJobOrchestrator};
use deployscan_store::{Storage, StoreConfig};

use crate::cli::DaemonCli;

/// Production event handler.
pub type DaemonHandler = EventHandler<DockerPlatform, Storage, EnvSecretStore>;

/// Load the configuration file and apply environment and CLI overrides.
///
/// Precedence: defaults < file < `DEPLOYSCAN_*` environment < CLI flags.
pub async fn load_config(cli: &DaemonCli) -> Result<DeployscanConfig> {
    let mut config = DeployscanConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    apply_cli_overrides(&mut config, cli);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    Ok(config)
}

/// Apply CLI flag overrides on top of the loaded configuration.
pub fn apply_cli_overrides(config: &mut DeployscanConfig, cli: &DaemonCli) {
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(backend) = &cli.backend {
        config.storage.backend = backend.clone();
    }
}

/// Derive every component configuration without connecting to anything.
///
/// Used by `--validate` so that bounds enforced by component crates are
/// reported as well.
pub fn validate_components(config: &DeployscanConfig) -> Result<()> {
    ScanJobConfig::from_core(&config.scanner)
        .map_err(|e| anyhow::anyhow!("invalid scanner config: {}", e))?;
    IntakeConfig::from_core(config).map_err(|e| anyhow::anyhow!("invalid intake config: {}", e))?;
    StoreConfig::from_core(&config.storage, &config.cache)
        .map_err(|e| anyhow::anyhow!("invalid storage config: {}", e))?;
    Ok(())
}

/// Assemble the production handler.
///
/// Opens the storage backend and connects to the Docker daemon. The Docker
/// connection is lazy; an unreachable daemon surfaces as a provisioning
/// failure on the first scan.
pub async fn build_handler(config: &DeployscanConfig) -> Result<DaemonHandler> {
    let scan_config = ScanJobConfig::from_core(&config.scanner)
        .map_err(|e| anyhow::anyhow!("invalid scanner config: {}", e))?;
    let intake_config = IntakeConfig::from_core(config)
        .map_err(|e| anyhow::anyhow!("invalid intake config: {}", e))?;
    let store_config = StoreConfig::from_core(&config.storage, &config.cache)
        .map_err(|e| anyhow::anyhow!("invalid storage config: {}", e))?;

    let storage = Storage::open(&store_config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to open storage: {}", e))?;
    tracing::info!(backend = %config.storage.backend, path = %config.storage.path, "storage ready");

    let platform = DockerPlatform::connect(&scan_config)
        .map_err(|e| anyhow::anyhow!("failed to create docker client: {}", e))?;
    tracing::info!(
        scanner_image = %scan_config.scanner_image,
        timeout_secs = scan_config.timeout_secs,
        "execution platform ready"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let orchestrator = ScanJobOrchestrator::new(Arc::new(platform), scan_config, Arc::clone(&clock));

    EventHandlerBuilder::new()
        .config(intake_config)
        .orchestrator(orchestrator)
        .storage(Arc::new(storage))
        .secrets(Arc::new(EnvSecretStore::new()))
        .notifier(Arc::new(TracingSink))
        .clock(clock)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build event handler: {}", e))
}
