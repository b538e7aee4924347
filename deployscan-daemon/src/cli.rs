//! CLI argument definitions for deployscan-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Deploy-triggered container image scanner.
///
/// Reads deployment events as newline-delimited JSON, scans every newly
/// deployed image in an ephemeral execution unit, and stores the results.
#[derive(Parser, Debug)]
#[command(name = "deployscan-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to deployscan.toml configuration file.
    #[arg(short, long, default_value = "/etc/deployscan/deployscan.toml")]
    pub config: PathBuf,

    /// Event source: a file of newline-delimited JSON events, or `-` for stdin.
    #[arg(short, long, default_value = "-")]
    pub input: String,

    /// Maximum number of events handled concurrently.
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub max_in_flight: u16,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override storage backend (sqlite, memory).
    #[arg(long)]
    pub backend: Option<String>,

    /// Validate configuration file and exit without reading events.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Whether events are read from standard input.
    pub fn reads_stdin(&self) -> bool {
        self.input == "-"
    }
}
