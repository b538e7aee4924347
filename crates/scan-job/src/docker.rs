//! Docker execution platform.
//!
//! [`DockerPlatform`] runs each scan as a labelled, resource-limited container
//! through the `bollard` client. Containers are created with the unit name as
//! the container name so that every later call addresses the same unit.
//!
//! # Examples
//!
//! ```ignore
//! use deployscan_scan_job::{DockerPlatform, ScanJobConfig};
//!
//! let config = ScanJobConfig::default();
//! let platform = DockerPlatform::connect(&config)?;
//! # Ok::<(), deployscan_scan_job::ScanJobError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use crate::config::ScanJobConfig;
use crate::error::ScanJobError;
use crate::platform::{ExecutionPlatform, UnitStatus, validate_unit_name};
use crate::spec::UnitSpec;

const NANO_CPUS_PER_CPU: f64 = 1_000_000_000.0;
const BYTES_PER_MIB: i64 = 1024 * 1024;

/// Production execution platform backed by the Docker daemon.
///
/// Internally uses `Arc<bollard::Docker>` for safe sharing across async tasks.
pub struct DockerPlatform {
    docker: Arc<bollard::Docker>,
    max_log_bytes: usize,
}

impl DockerPlatform {
    /// Connects using the configured socket, or the platform default when empty.
    ///
    /// # Errors
    ///
    /// Returns `ScanJobError::Platform` if the connection cannot be set up.
    pub fn connect(config: &ScanJobConfig) -> Result<Self, ScanJobError> {
        let docker = if config.docker_socket.is_empty() {
            bollard::Docker::connect_with_local_defaults().map_err(|e| {
                ScanJobError::Platform(format!("failed to connect to docker: {e}"))
            })?
        } else {
            bollard::Docker::connect_with_socket(
                &config.docker_socket,
                120,
                bollard::API_DEFAULT_VERSION,
            )
            .map_err(|e| {
                ScanJobError::Platform(format!(
                    "failed to connect to docker at {}: {e}",
                    config.docker_socket
                ))
            })?
        };
        Ok(Self {
            docker: Arc::new(docker),
            max_log_bytes: config.max_log_bytes,
        })
    }

    async fn pull_image(&self, image: &str) -> Result<(), bollard::errors::Error> {
        use bollard::image::CreateImageOptions;

        let options = CreateImageOptions {
            from_image: image.to_owned(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress?;
        }
        debug!(image, "scanner image pulled");
        Ok(())
    }

    async fn create_container(&self, spec: &UnitSpec) -> Result<(), bollard::errors::Error> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::HostConfig;

        let labels: HashMap<String, String> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let memory = i64::try_from(spec.memory_mib)
            .unwrap_or(i64::MAX / BYTES_PER_MIB)
            .saturating_mul(BYTES_PER_MIB);
        // f64 -> i64 `as` saturates
        let nano_cpus = (spec.cpus * NANO_CPUS_PER_CPU) as i64;

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.args.clone()),
            env: Some(spec.env_pairs()),
            labels: Some(labels),
            host_config: Some(HostConfig {
                memory: Some(memory),
                nano_cpus: Some(nano_cpus),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        self.docker
            .create_container(Some(options), config)
            .await
            .map(|_| ())
    }
}

fn is_status(err: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

fn map_missing(name: &str, action: &str, err: bollard::errors::Error) -> ScanJobError {
    if is_status(&err, 404) {
        ScanJobError::UnitNotFound(name.to_owned())
    } else {
        ScanJobError::Platform(format!("{action} '{name}' failed: {err}"))
    }
}

/// Keeps at most `max` trailing bytes, cutting on a char boundary.
fn keep_tail(buf: &mut String, max: usize) {
    if buf.len() <= max {
        return;
    }
    let mut cut = buf.len() - max;
    while !buf.is_char_boundary(cut) {
        cut += 1;
    }
    buf.drain(..cut);
}

impl ExecutionPlatform for DockerPlatform {
    async fn create(&self, spec: &UnitSpec) -> Result<(), ScanJobError> {
        validate_unit_name(&spec.name)?;

        let provisioning = |reason: String| ScanJobError::Provisioning {
            unit: spec.name.clone(),
            reason,
        };

        match self.create_container(spec).await {
            Ok(()) => {}
            Err(e) if is_status(&e, 404) => {
                debug!(image = %spec.image, "scanner image missing locally, pulling");
                self.pull_image(&spec.image)
                    .await
                    .map_err(|e| provisioning(format!("image pull failed: {e}")))?;
                self.create_container(spec)
                    .await
                    .map_err(|e| provisioning(format!("create failed: {e}")))?;
            }
            Err(e) => return Err(provisioning(format!("create failed: {e}"))),
        }

        use bollard::container::StartContainerOptions;
        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| provisioning(format!("start failed: {e}")))?;

        debug!(unit = %spec.name, "container started");
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<UnitStatus, ScanJobError> {
        use bollard::models::ContainerStateStatusEnum;

        validate_unit_name(name)?;
        let details = self
            .docker
            .inspect_container(name, None)
            .await
            .map_err(|e| map_missing(name, "inspect", e))?;

        let Some(state) = details.state else {
            return Ok(UnitStatus::Pending);
        };

        let status = match state.status {
            Some(ContainerStateStatusEnum::RUNNING)
            | Some(ContainerStateStatusEnum::PAUSED)
            | Some(ContainerStateStatusEnum::RESTARTING) => UnitStatus::Running,
            Some(ContainerStateStatusEnum::EXITED) => UnitStatus::Exited {
                exit_code: state.exit_code.unwrap_or(-1),
            },
            Some(ContainerStateStatusEnum::DEAD) | Some(ContainerStateStatusEnum::REMOVING) => {
                match state.error.filter(|e| !e.is_empty()) {
                    Some(reason) => UnitStatus::ProvisioningFailed { reason },
                    None => UnitStatus::Exited {
                        exit_code: state.exit_code.unwrap_or(-1),
                    },
                }
            }
            _ => UnitStatus::Pending,
        };
        Ok(status)
    }

    async fn logs(&self, name: &str) -> Result<String, ScanJobError> {
        use bollard::container::LogsOptions;

        validate_unit_name(name)?;
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_owned(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_missing(name, "logs", e))?;
            text.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
            if text.len() > self.max_log_bytes.saturating_mul(2) {
                keep_tail(&mut text, self.max_log_bytes);
            }
        }
        keep_tail(&mut text, self.max_log_bytes);
        Ok(text)
    }

    async fn terminate(&self, name: &str) -> Result<(), ScanJobError> {
        use bollard::container::KillContainerOptions;

        validate_unit_name(name)?;
        match self
            .docker
            .kill_container(name, None::<KillContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 409: already stopped
            Err(e) if is_status(&e, 409) => Ok(()),
            Err(e) => Err(map_missing(name, "kill", e)),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), ScanJobError> {
        use bollard::container::RemoveContainerOptions;

        validate_unit_name(name)?;
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(ScanJobError::Platform(format!(
                "remove '{name}' failed: {e}"
            ))),
        }
    }
}
