#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`IntakeError`)
//! - [`config`]: Intake configuration (`IntakeConfig`, builder)
//! - [`event`]: Deployment event model and image extraction
//! - [`filter`]: Event screening (`screen`, `IgnoreReason`)
//! - [`lookup`]: Deployed image lookup for events without a container spec (`ContainerLookup`)
//! - [`alert`]: Notification sinks (`NotificationSink`, `TracingSink`, `ChannelSink`)
//! - [`handler`]: Per-event pipeline (`EventHandler`, `HandleReport`)
//!
//! # Architecture
//!
//! ```text
//! raw JSON --> DeploymentEvent --> screen() --> images(kind) --(empty)--> ContainerLookup
//!                                                  |
//!                       per image: ImageReference::from_fragment()
//!                                                  |
//!                              ScanCache.should_scan() --(recent)--> CacheHit
//!                                                  |
//!                              ScanJobOrchestrator.run()
//!                                                  |
//!                    ResultStore.save() / save_error() --> ScanCache.record()
//!                                                  |
//!                              NotificationSink.raise() (threshold)
//! ```

pub mod alert;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod handler;
pub mod lookup;

// --- Public API Re-exports ---

// Handler
pub use handler::{
    EventHandler, EventHandlerBuilder, HandleReport, ImageOutcome, ImageReport, UNKNOWN_EVENT_ID,
};

// Configuration
pub use config::{IntakeConfig, IntakeConfigBuilder};

// Error
pub use error::IntakeError;

// Events
pub use event::{ContainerKind, DeploymentEvent, ImageSpec};
pub use filter::{IgnoreReason, screen};
pub use lookup::{ContainerLookup, ContainerTarget, NoLookup, StaticLookup};

// Alerts
pub use alert::{ChannelSink, NotificationSink, TracingSink};
