use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;

use deployscan_daemon::cli::DaemonCli;
use deployscan_daemon::source::{self, RunSummary};
use deployscan_daemon::{logging, metrics_server, wiring};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = DaemonCli::parse();
    let config = wiring::load_config(&cli).await?;

    if cli.validate {
        wiring::validate_components(&config)?;
        println!("configuration is valid: {}", cli.config.display());
        return Ok(ExitCode::SUCCESS);
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "deployscan-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let handler = Arc::new(wiring::build_handler(&config).await?);
    let max_in_flight = usize::from(cli.max_in_flight);

    let shutdown = async {
        match source::wait_for_shutdown_signal().await {
            Ok(signal) => tracing::info!(signal, "shutdown signal received"),
            Err(e) => {
                tracing::error!(error = %e, "signal handling unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    let summary: RunSummary = if cli.reads_stdin() {
        tracing::info!("reading events from stdin");
        let reader = BufReader::new(tokio::io::stdin());
        source::process_events(reader, handler, max_in_flight, shutdown).await?
    } else {
        tracing::info!(input = %cli.input, "reading events from file");
        let file = tokio::fs::File::open(&cli.input)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open event source {}: {}", cli.input, e))?;
        source::process_events(BufReader::new(file), handler, max_in_flight, shutdown).await?
    };

    println!("{summary}");
    if summary.is_clean() {
        tracing::info!("deployscan-daemon finished");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(
            events = ?summary.redelivery,
            panicked = summary.panicked,
            "some events were not fully stored and need redelivery"
        );
        Ok(ExitCode::FAILURE)
    }
}
