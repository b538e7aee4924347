//! Execution platform abstraction for testability.
//!
//! The [`ExecutionPlatform`] trait covers the five operations the orchestrator
//! needs from an ephemeral compute provider: create, poll status, fetch logs,
//! terminate and delete. Production code uses [`DockerPlatform`](crate::docker::DockerPlatform);
//! tests use `MockPlatform` with scripted status sequences.
//!
//! # Unit Name Validation
//!
//! Unit names are generated by the orchestrator and validated before every call:
//! - Must be 1-63 characters
//! - Must contain only `[a-z0-9-]`
//! - Must not start or end with `-`

use std::future::Future;

use crate::error::ScanJobError;
use crate::spec::UnitSpec;

/// Maximum length of an execution unit name.
pub const MAX_UNIT_NAME_LEN: usize = 63;

/// Status of an execution unit as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Accepted but not started yet (scheduling, pulling the image).
    Pending,
    /// The scanner process is running.
    Running,
    /// The scanner process exited.
    Exited {
        /// Process exit code.
        exit_code: i64,
    },
    /// The platform gave up starting the unit (quota, image pull, credentials).
    ProvisioningFailed {
        /// Platform-reported reason.
        reason: String,
    },
}

/// Validates an execution unit name.
pub fn validate_unit_name(name: &str) -> Result<(), ScanJobError> {
    if name.is_empty() || name.len() > MAX_UNIT_NAME_LEN {
        return Err(ScanJobError::Platform(format!(
            "invalid unit name: length {} (must be 1-{MAX_UNIT_NAME_LEN})",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ScanJobError::Platform(format!(
            "invalid unit name '{name}': must contain only [a-z0-9-]"
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(ScanJobError::Platform(format!(
            "invalid unit name '{name}': must not start or end with '-'"
        )));
    }
    Ok(())
}

/// Trait abstracting an ephemeral compute platform.
///
/// The trait is `Send + Sync + 'static`, allowing the orchestrator to share one
/// platform client across concurrently handled events.
///
/// # Error Handling
///
/// - **Create failures**: `ScanJobError::Provisioning`
/// - **Missing units**: `ScanJobError::UnitNotFound` from `status`/`logs`/`terminate`
/// - **Other API failures**: `ScanJobError::Platform`
pub trait ExecutionPlatform: Send + Sync + 'static {
    /// Creates and starts a unit from the given spec.
    ///
    /// # Errors
    ///
    /// - `ScanJobError::Provisioning`: the unit could not be created or started
    fn create(&self, spec: &UnitSpec) -> impl Future<Output = Result<(), ScanJobError>> + Send;

    /// Returns the current status of a unit.
    fn status(&self, name: &str) -> impl Future<Output = Result<UnitStatus, ScanJobError>> + Send;

    /// Returns the captured stdout/stderr of a unit as text.
    fn logs(&self, name: &str) -> impl Future<Output = Result<String, ScanJobError>> + Send;

    /// Requests termination of a running unit regardless of its internal state.
    fn terminate(&self, name: &str) -> impl Future<Output = Result<(), ScanJobError>> + Send;

    /// Deletes a unit and its resources.
    ///
    /// Deleting a unit that does not exist succeeds.
    fn delete(&self, name: &str) -> impl Future<Output = Result<(), ScanJobError>> + Send;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_generated_names() {
        validate_unit_name("dscan-nginx-1700000000000-a1b2c3").unwrap();
        validate_unit_name("a").unwrap();
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["", "-lead", "trail-", "Upper", "under_score", "dot.name"] {
            assert!(validate_unit_name(name).is_err(), "{name:?} should fail");
        }
        assert!(validate_unit_name(&"a".repeat(MAX_UNIT_NAME_LEN + 1)).is_err());
    }
}
