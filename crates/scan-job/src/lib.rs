#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`ScanJobError`)
//! - [`config`]: Job configuration (`ScanJobConfig`, builder)
//! - [`credentials`]: Secret store abstraction and redacted credential values
//! - [`spec`]: Typed execution unit spec (`UnitSpec`, `JobContext`)
//! - [`platform`]: Execution platform abstraction (`ExecutionPlatform` trait)
//! - [`docker`]: Docker-backed platform (`DockerPlatform`)
//! - [`state`]: Job state machine (`JobState`, `evaluate_poll`)
//! - [`output`]: Scanner output extraction and report parsing
//! - [`orchestrator`]: Main orchestrator (`ScanJobOrchestrator`, `JobReport`)
//!
//! # Architecture
//!
//! ```text
//! ImageReference --> ScanJobOrchestrator.run()
//!                        |
//!                    ExecutionPlatform.create() / status() (poll) / logs()
//!                        |
//!                    output::extract_report() --> ScanResult
//!                        |
//!                    ExecutionPlatform.delete()  (every path)
//! ```

pub mod config;
pub mod credentials;
pub mod docker;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod platform;
pub mod spec;
pub mod state;

// --- Public API Re-exports ---

// Orchestrator
pub use orchestrator::{JobReport, ScanJobOrchestrator};

// Configuration
pub use config::{ScanJobConfig, ScanJobConfigBuilder};

// Error
pub use error::ScanJobError;

// Credentials
pub use credentials::{Credentials, EnvSecretStore, SecretStore, SecretValue, StaticSecretStore};

// Platform
pub use docker::DockerPlatform;
pub use platform::{ExecutionPlatform, UnitStatus};
pub use spec::{JobContext, UnitSpec};

// State machine
pub use state::{JobSignal, JobState, PollDecision, evaluate_poll};
