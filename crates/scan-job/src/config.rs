//! 스캔 잡 설정
//!
//! [`ScanJobConfig`]는 core의 [`ScannerConfig`](deployscan_core::config::ScannerConfig)를
//! 기반으로 오케스트레이터 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use deployscan_core::config::DeployscanConfig;
//! use deployscan_scan_job::config::ScanJobConfig;
//!
//! let core_config = DeployscanConfig::default();
//! let config = ScanJobConfig::from_core(&core_config.scanner)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use deployscan_core::config::{CredentialMapping, ScannerConfig};

use crate::error::ScanJobError;

/// 스캐너 인자 템플릿의 이미지 자리 표시자
pub const IMAGE_PLACEHOLDER: &str = "{image}";

/// 스캔 잡 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJobConfig {
    /// Docker 소켓 경로
    pub docker_socket: String,
    /// 스캐너 도구 이미지
    pub scanner_image: String,
    /// 스캐너 인자 템플릿 (`{image}` 포함)
    pub args: Vec<String>,
    /// 실행 단위 이름 접두어 (자체 트리거 필터에도 사용)
    pub job_name_prefix: String,
    /// 잡 제한 시간 (초)
    pub timeout_secs: u64,
    /// 상태 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 메모리 제한 (MiB)
    pub memory_mib: u64,
    /// CPU 제한 (코어 수)
    pub cpus: f64,
    /// 보관할 최대 로그 크기 (바이트, 끝부분 유지)
    pub max_log_bytes: usize,
    /// 비밀 이름 → 환경 변수 매핑
    pub credentials: Vec<CredentialMapping>,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 플랫폼 API 호출 하나의 타임아웃 (초)
    pub platform_call_timeout_secs: u64,
    /// 연속 상태 조회 실패 허용 횟수
    pub max_status_errors: u32,
}

impl Default for ScanJobConfig {
    fn default() -> Self {
        let core = ScannerConfig::default();
        Self {
            docker_socket: core.docker_socket,
            scanner_image: core.image,
            args: core.args,
            job_name_prefix: core.job_name_prefix,
            timeout_secs: core.timeout_secs,
            poll_interval_secs: core.poll_interval_secs,
            memory_mib: core.memory_mib,
            cpus: core.cpus,
            max_log_bytes: core.max_log_bytes,
            credentials: core.credentials,
            platform_call_timeout_secs: 30,
            max_status_errors: 3,
        }
    }
}

/// 설정 상한값 상수
const MAX_TIMEOUT_SECS: u64 = 86_400;
const MAX_POLL_INTERVAL_SECS: u64 = 600;
const MAX_PREFIX_LEN: usize = 20;
const MIN_MEMORY_MIB: u64 = 64;
const MAX_CPUS: f64 = 64.0;
const MIN_LOG_BYTES: usize = 1024;
const MAX_LOG_BYTES: usize = 256 * 1024 * 1024;
const MAX_CALL_TIMEOUT_SECS: u64 = 600;
const MAX_STATUS_ERRORS: u32 = 20;

impl ScanJobConfig {
    /// core의 `ScannerConfig`에서 잡 설정을 생성하고 검증합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &ScannerConfig) -> Result<Self, ScanJobError> {
        let config = Self {
            docker_socket: core.docker_socket.clone(),
            scanner_image: core.image.clone(),
            args: core.args.clone(),
            job_name_prefix: core.job_name_prefix.clone(),
            timeout_secs: core.timeout_secs,
            poll_interval_secs: core.poll_interval_secs,
            memory_mib: core.memory_mib,
            cpus: core.cpus,
            max_log_bytes: core.max_log_bytes,
            credentials: core.credentials.clone(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn platform_call_timeout(&self) -> Duration {
        Duration::from_secs(self.platform_call_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ScanJobError> {
        if self.scanner_image.trim().is_empty() {
            return Err(config_err("scanner_image", "must not be empty"));
        }

        if !self.args.iter().any(|a| a.contains(IMAGE_PLACEHOLDER)) {
            return Err(config_err(
                "args",
                format!("must contain the {IMAGE_PLACEHOLDER} placeholder"),
            ));
        }

        if self.job_name_prefix.is_empty()
            || self.job_name_prefix.len() > MAX_PREFIX_LEN
            || self.job_name_prefix.starts_with('-')
            || !self
                .job_name_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(config_err(
                "job_name_prefix",
                format!("must be 1-{MAX_PREFIX_LEN} chars of [a-z0-9-] not starting with '-'"),
            ));
        }

        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(config_err(
                "timeout_secs",
                format!("must be 1-{MAX_TIMEOUT_SECS}"),
            ));
        }

        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(config_err(
                "poll_interval_secs",
                format!("must be 1-{MAX_POLL_INTERVAL_SECS}"),
            ));
        }

        if self.poll_interval_secs > self.timeout_secs {
            return Err(config_err(
                "poll_interval_secs",
                "must not exceed timeout_secs",
            ));
        }

        if self.memory_mib < MIN_MEMORY_MIB {
            return Err(config_err(
                "memory_mib",
                format!("must be at least {MIN_MEMORY_MIB}"),
            ));
        }

        if !(self.cpus > 0.0 && self.cpus <= MAX_CPUS) {
            return Err(config_err("cpus", format!("must be in (0, {MAX_CPUS}]")));
        }

        if self.max_log_bytes < MIN_LOG_BYTES || self.max_log_bytes > MAX_LOG_BYTES {
            return Err(config_err(
                "max_log_bytes",
                format!("must be {MIN_LOG_BYTES}-{MAX_LOG_BYTES}"),
            ));
        }

        if self.platform_call_timeout_secs == 0
            || self.platform_call_timeout_secs > MAX_CALL_TIMEOUT_SECS
        {
            return Err(config_err(
                "platform_call_timeout_secs",
                format!("must be 1-{MAX_CALL_TIMEOUT_SECS}"),
            ));
        }

        if self.max_status_errors > MAX_STATUS_ERRORS {
            return Err(config_err(
                "max_status_errors",
                format!("must be 0-{MAX_STATUS_ERRORS}"),
            ));
        }

        for mapping in &self.credentials {
            if mapping.env.is_empty() || mapping.secret.is_empty() {
                return Err(config_err(
                    "credentials",
                    "env and secret names must not be empty",
                ));
            }
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> ScanJobError {
    ScanJobError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 스캔 잡 설정 빌더
#[derive(Default)]
pub struct ScanJobConfigBuilder {
    config: ScanJobConfig,
}

impl ScanJobConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scanner_image(mut self, image: impl Into<String>) -> Self {
        self.config.scanner_image = image.into();
        self
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.config.args = args;
        self
    }

    pub fn job_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.job_name_prefix = prefix.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    pub fn memory_mib(mut self, mib: u64) -> Self {
        self.config.memory_mib = mib;
        self
    }

    pub fn cpus(mut self, cpus: f64) -> Self {
        self.config.cpus = cpus;
        self
    }

    pub fn max_log_bytes(mut self, bytes: usize) -> Self {
        self.config.max_log_bytes = bytes;
        self
    }

    pub fn credentials(mut self, credentials: Vec<CredentialMapping>) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn platform_call_timeout_secs(mut self, secs: u64) -> Self {
        self.config.platform_call_timeout_secs = secs;
        self
    }

    pub fn max_status_errors(mut self, max: u32) -> Self {
        self.config.max_status_errors = max;
        self
    }

    /// 설정을 검증하고 `ScanJobConfig`를 생성합니다.
    pub fn build(self) -> Result<ScanJobConfig, ScanJobError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ScanJobConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let core = ScannerConfig {
            image: "registry.local/scanner:2".to_owned(),
            timeout_secs: 600,
            poll_interval_secs: 5,
            ..ScannerConfig::default()
        };
        let config = ScanJobConfig::from_core(&core).unwrap();
        assert_eq!(config.scanner_image, "registry.local/scanner:2");
        assert_eq!(config.timeout(), Duration::from_secs(600));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.platform_call_timeout_secs, 30);
    }

    #[test]
    fn rejects_missing_placeholder() {
        let err = ScanJobConfigBuilder::new()
            .args(vec!["image".to_owned(), "nginx".to_owned()])
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanJobError::Config { ref field, .. } if field == "args"));
    }

    #[test]
    fn rejects_bad_prefix() {
        for prefix in ["", "-dscan", "Dscan-", "dscan_", "a-very-long-prefix-that-overflows-"] {
            let err = ScanJobConfigBuilder::new()
                .job_name_prefix(prefix)
                .build()
                .unwrap_err();
            assert!(
                matches!(err, ScanJobError::Config { ref field, .. } if field == "job_name_prefix"),
                "prefix {prefix:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_poll_longer_than_timeout() {
        let err = ScanJobConfigBuilder::new()
            .timeout_secs(5)
            .poll_interval_secs(10)
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanJobError::Config { .. }));
    }

    #[test]
    fn rejects_zero_values() {
        assert!(ScanJobConfigBuilder::new().timeout_secs(0).build().is_err());
        assert!(ScanJobConfigBuilder::new().cpus(0.0).build().is_err());
        assert!(ScanJobConfigBuilder::new().cpus(f64::NAN).build().is_err());
        assert!(ScanJobConfigBuilder::new().memory_mib(0).build().is_err());
        assert!(
            ScanJobConfigBuilder::new()
                .platform_call_timeout_secs(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn rejects_empty_credential_mapping() {
        let err = ScanJobConfigBuilder::new()
            .credentials(vec![CredentialMapping {
                env: String::new(),
                secret: "token".to_owned(),
            }])
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanJobError::Config { ref field, .. } if field == "credentials"));
    }
}
