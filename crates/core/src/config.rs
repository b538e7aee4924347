//! 설정 관리 — deployscan.toml 파싱 및 런타임 설정
//!
//! [`DeployscanConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DEPLOYSCAN_CACHE_WINDOW_HOURS=12` 형식)
//! 3. 설정 파일 (`deployscan.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), deployscan_core::error::DeployscanError> {
//! use deployscan_core::config::DeployscanConfig;
//!
//! let config = DeployscanConfig::load("deployscan.toml").await?;
//! let config = DeployscanConfig::parse("[cache]\nwindow_hours = 12")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DeployscanError};
use crate::types::Severity;

/// 배포 이벤트 타입 기본값
pub const DEFAULT_EVENT_TYPE: &str = "Microsoft.Resources.ResourceWriteSuccess";

/// 스캔 실행 단위 이름 접두어 기본값
pub const DEFAULT_JOB_NAME_PREFIX: &str = "dscan-";

/// Deployscan 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployscanConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 이벤트 수신 설정
    #[serde(default)]
    pub intake: IntakeConfig,
    /// 스캐너 실행 설정
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// 스캔 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// 결과 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 알림 설정
    #[serde(default)]
    pub alert: AlertConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl DeployscanConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DeployscanError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DeployscanError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeployscanError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DeployscanError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DeployscanError> {
        toml::from_str(toml_str).map_err(|e| {
            DeployscanError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DEPLOYSCAN_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DEPLOYSCAN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DEPLOYSCAN_GENERAL_LOG_FORMAT");

        // Intake
        override_csv(
            &mut self.intake.accepted_event_types,
            "DEPLOYSCAN_INTAKE_ACCEPTED_EVENT_TYPES",
        );
        override_bool(
            &mut self.intake.container_groups,
            "DEPLOYSCAN_INTAKE_CONTAINER_GROUPS",
        );
        override_bool(
            &mut self.intake.container_apps,
            "DEPLOYSCAN_INTAKE_CONTAINER_APPS",
        );
        override_csv(
            &mut self.intake.ignored_name_prefixes,
            "DEPLOYSCAN_INTAKE_IGNORED_NAME_PREFIXES",
        );

        // Scanner
        override_string(&mut self.scanner.image, "DEPLOYSCAN_SCANNER_IMAGE");
        override_string(
            &mut self.scanner.docker_socket,
            "DEPLOYSCAN_SCANNER_DOCKER_SOCKET",
        );
        override_string(
            &mut self.scanner.job_name_prefix,
            "DEPLOYSCAN_SCANNER_JOB_NAME_PREFIX",
        );
        override_u64(
            &mut self.scanner.timeout_secs,
            "DEPLOYSCAN_SCANNER_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.scanner.poll_interval_secs,
            "DEPLOYSCAN_SCANNER_POLL_INTERVAL_SECS",
        );
        override_u64(&mut self.scanner.memory_mib, "DEPLOYSCAN_SCANNER_MEMORY_MIB");
        override_f64(&mut self.scanner.cpus, "DEPLOYSCAN_SCANNER_CPUS");
        override_usize(
            &mut self.scanner.max_log_bytes,
            "DEPLOYSCAN_SCANNER_MAX_LOG_BYTES",
        );

        // Cache
        override_u64(&mut self.cache.window_hours, "DEPLOYSCAN_CACHE_WINDOW_HOURS");

        // Storage
        override_string(&mut self.storage.backend, "DEPLOYSCAN_STORAGE_BACKEND");
        override_string(&mut self.storage.path, "DEPLOYSCAN_STORAGE_PATH");

        // Alert
        override_bool(&mut self.alert.enabled, "DEPLOYSCAN_ALERT_ENABLED");
        override_string(
            &mut self.alert.severity_threshold,
            "DEPLOYSCAN_ALERT_SEVERITY_THRESHOLD",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "DEPLOYSCAN_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "DEPLOYSCAN_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "DEPLOYSCAN_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DeployscanError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.intake.accepted_event_types.is_empty() {
            return Err(invalid(
                "intake.accepted_event_types",
                "at least one event type is required",
            ));
        }
        if !self.intake.container_groups && !self.intake.container_apps {
            return Err(invalid(
                "intake.container_groups",
                "at least one container kind must be enabled",
            ));
        }

        if self.scanner.image.trim().is_empty() {
            return Err(invalid("scanner.image", "must not be empty"));
        }
        if self.scanner.job_name_prefix.is_empty() {
            // 자기 자신이 만든 실행 단위를 걸러내려면 접두어가 반드시 필요
            return Err(invalid("scanner.job_name_prefix", "must not be empty"));
        }
        if !self.scanner.args.iter().any(|a| a.contains("{image}")) {
            return Err(invalid(
                "scanner.args",
                "must contain the '{image}' placeholder",
            ));
        }
        if self.scanner.poll_interval_secs == 0 {
            return Err(invalid("scanner.poll_interval_secs", "must be at least 1"));
        }
        if self.scanner.timeout_secs < self.scanner.poll_interval_secs {
            return Err(invalid(
                "scanner.timeout_secs",
                "must not be shorter than scanner.poll_interval_secs",
            ));
        }
        if !(self.scanner.cpus > 0.0) {
            return Err(invalid("scanner.cpus", "must be greater than 0"));
        }

        let valid_backends = ["sqlite", "memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(invalid(
                "storage.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }

        if Severity::from_str_loose(&self.alert.severity_threshold).is_none() {
            return Err(invalid(
                "alert.severity_threshold",
                "must be one of: info, low, medium, high, critical",
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must not be 0 when metrics are enabled"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> DeployscanError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 이벤트 수신 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// 처리할 이벤트 타입 목록
    pub accepted_event_types: Vec<String>,
    /// 컨테이너 그룹 배포 처리 여부
    pub container_groups: bool,
    /// 컨테이너 앱 배포 처리 여부
    pub container_apps: bool,
    /// 추가로 무시할 리소스 이름 접두어 (스캐너 접두어는 항상 무시)
    pub ignored_name_prefixes: Vec<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            accepted_event_types: vec![DEFAULT_EVENT_TYPE.to_owned()],
            container_groups: true,
            container_apps: true,
            ignored_name_prefixes: Vec::new(),
        }
    }
}

/// 스캐너 자격 증명 매핑
///
/// 비밀 저장소의 `secret` 값을 실행 단위의 환경변수 `env`로 주입합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMapping {
    pub env: String,
    pub secret: String,
}

/// 스캐너 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Docker 소켓 경로
    pub docker_socket: String,
    /// 스캐너 도구 이미지
    pub image: String,
    /// 스캐너 인자 (`{image}`는 대상 이미지의 정규 식별자로 치환)
    pub args: Vec<String>,
    /// 실행 단위 이름 접두어
    pub job_name_prefix: String,
    /// 스캔 제한 시간 (초)
    pub timeout_secs: u64,
    /// 상태 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 메모리 제한 (MiB)
    pub memory_mib: u64,
    /// CPU 제한
    pub cpus: f64,
    /// 수집할 최대 로그 크기 (바이트)
    pub max_log_bytes: usize,
    /// 자격 증명 매핑
    pub credentials: Vec<CredentialMapping>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            docker_socket: "/var/run/docker.sock".to_owned(),
            image: "qualys/qscanner:latest".to_owned(),
            args: vec![
                "image".to_owned(),
                "{image}".to_owned(),
                "--scan-types".to_owned(),
                "os,sca,secret".to_owned(),
                "--format".to_owned(),
                "json".to_owned(),
            ],
            job_name_prefix: DEFAULT_JOB_NAME_PREFIX.to_owned(),
            timeout_secs: 1800,
            poll_interval_secs: 10,
            memory_mib: 4096,
            cpus: 2.0,
            max_log_bytes: 16 * 1024 * 1024,
            credentials: vec![CredentialMapping {
                env: "QUALYS_ACCESS_TOKEN".to_owned(),
                secret: "qualys-access-token".to_owned(),
            }],
        }
    }
}

/// 스캔 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 재스캔을 억제하는 기간 (시간)
    pub window_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { window_hours: 24 }
    }
}

/// 결과 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 저장소 백엔드 (sqlite, memory)
    pub backend: String,
    /// SQLite 백엔드 루트 경로 (데이터베이스 파일과 결과 객체 디렉토리)
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_owned(),
            path: "/var/lib/deployscan/store".to_owned(),
        }
    }
}

/// 알림 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 알림 기준 심각도 (이 심각도 이상 취약점이 있으면 알림)
    pub severity_threshold: String,
}

impl AlertConfig {
    /// 기준 심각도. 검증을 거친 설정이면 항상 `Some`입니다.
    pub fn threshold(&self) -> Severity {
        Severity::from_str_loose(&self.severity_threshold).unwrap_or(Severity::High)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            severity_threshold: "high".to_owned(),
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9107,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_f64(target: &mut f64, env_key: &str) {
    override_parsed(target, env_key, "f64");
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = DeployscanConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.cache.window_hours, 24);
        assert_eq!(config.scanner.timeout_secs, 1800);
        assert_eq!(config.scanner.poll_interval_secs, 10);
        assert_eq!(config.scanner.job_name_prefix, "dscan-");
        assert_eq!(config.alert.threshold(), Severity::High);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        DeployscanConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = DeployscanConfig::parse("").unwrap();
        assert_eq!(
            config.intake.accepted_event_types,
            vec![DEFAULT_EVENT_TYPE.to_owned()]
        );
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[cache]
window_hours = 6

[scanner]
image = "registry.local/scanner:2"
timeout_secs = 600

[[scanner.credentials]]
env = "SCANNER_TOKEN"
secret = "scanner-token"
"#;
        let config = DeployscanConfig::parse(toml).unwrap();
        assert_eq!(config.cache.window_hours, 6);
        assert_eq!(config.scanner.image, "registry.local/scanner:2");
        assert_eq!(config.scanner.timeout_secs, 600);
        assert_eq!(config.scanner.poll_interval_secs, 10);
        assert_eq!(config.scanner.credentials.len(), 1);
        assert_eq!(config.scanner.credentials[0].env, "SCANNER_TOKEN");
        assert_eq!(config.general.log_format, "json");
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = DeployscanConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            DeployscanError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = DeployscanConfig::default();
        config.general.log_level = "verbose".to_owned();
        assert!(config.validate().unwrap_err().to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_empty_prefix() {
        let mut config = DeployscanConfig::default();
        config.scanner.job_name_prefix = String::new();
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("job_name_prefix")
        );
    }

    #[test]
    fn validate_rejects_args_without_placeholder() {
        let mut config = DeployscanConfig::default();
        config.scanner.args = vec!["scan".to_owned()];
        assert!(config.validate().unwrap_err().to_string().contains("scanner.args"));
    }

    #[test]
    fn validate_rejects_timeout_shorter_than_poll() {
        let mut config = DeployscanConfig::default();
        config.scanner.timeout_secs = 5;
        assert!(config.validate().unwrap_err().to_string().contains("timeout_secs"));
    }

    #[test]
    fn validate_rejects_unknown_threshold() {
        let mut config = DeployscanConfig::default();
        config.alert.severity_threshold = "severe".to_owned();
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("severity_threshold")
        );
    }

    #[test]
    fn validate_rejects_unknown_backend() {
        let mut config = DeployscanConfig::default();
        config.storage.backend = "s3".to_owned();
        assert!(config.validate().unwrap_err().to_string().contains("backend"));
    }

    #[test]
    fn validate_requires_a_container_kind() {
        let mut config = DeployscanConfig::default();
        config.intake.container_groups = false;
        config.intake.container_apps = false;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        // SAFETY: serial 테스트로 실행되어 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe {
            std::env::set_var("DEPLOYSCAN_CACHE_WINDOW_HOURS", "48");
            std::env::set_var("DEPLOYSCAN_ALERT_SEVERITY_THRESHOLD", "critical");
            std::env::set_var("DEPLOYSCAN_INTAKE_IGNORED_NAME_PREFIXES", "qscanner-, tmp-");
        }
        let mut config = DeployscanConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("DEPLOYSCAN_CACHE_WINDOW_HOURS");
            std::env::remove_var("DEPLOYSCAN_ALERT_SEVERITY_THRESHOLD");
            std::env::remove_var("DEPLOYSCAN_INTAKE_IGNORED_NAME_PREFIXES");
        }
        assert_eq!(config.cache.window_hours, 48);
        assert_eq!(config.alert.threshold(), Severity::Critical);
        assert_eq!(config.intake.ignored_name_prefixes, vec!["qscanner-", "tmp-"]);
    }

    #[test]
    #[serial]
    fn env_override_invalid_number_keeps_original() {
        // SAFETY: serial 테스트로 실행되어 다른 스레드가 환경변수를 읽지 않습니다.
        unsafe { std::env::set_var("DEPLOYSCAN_SCANNER_TIMEOUT_SECS", "soon") };
        let mut config = DeployscanConfig::default();
        config.apply_env_overrides();
        unsafe { std::env::remove_var("DEPLOYSCAN_SCANNER_TIMEOUT_SECS") };
        assert_eq!(config.scanner.timeout_secs, 1800);
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "DEPLOYSCAN_TEST_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = DeployscanConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = DeployscanConfig::parse(&toml_str).unwrap();
        assert_eq!(config.scanner.args, parsed.scanner.args);
        assert_eq!(config.scanner.credentials, parsed.scanner.credentials);
        assert_eq!(config.cache.window_hours, parsed.cache.window_hours);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = DeployscanConfig::from_file("/nonexistent/path/deployscan.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployscanError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
