//! 이벤트 수신 설정
//!
//! [`IntakeConfig`]는 core 설정의 `[intake]`, `[cache]`, `[alert]` 섹션과 스캐너 잡 이름 접두어를
//! 하나로 모은 런타임 설정입니다. 스캐너 접두어는 항상 무시 목록에 포함됩니다.

use serde::{Deserialize, Serialize};

use deployscan_core::config::{DEFAULT_EVENT_TYPE, DEFAULT_JOB_NAME_PREFIX, DeployscanConfig};
use deployscan_core::types::Severity;

use crate::error::IntakeError;

/// 이벤트 수신 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// 처리할 이벤트 타입
    pub accepted_event_types: Vec<String>,
    /// 컨테이너 그룹 배포 처리 여부
    pub container_groups: bool,
    /// 컨테이너 앱 배포 처리 여부
    pub container_apps: bool,
    /// 무시할 리소스 이름 접두어 (스캐너 잡 접두어 포함)
    pub ignored_name_prefixes: Vec<String>,
    /// 중복 스캔 억제 윈도우 (시간)
    pub window_hours: u64,
    /// 알림 활성화
    pub alert_enabled: bool,
    /// 알림 기준 심각도
    pub alert_threshold: Severity,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            accepted_event_types: vec![DEFAULT_EVENT_TYPE.to_owned()],
            container_groups: true,
            container_apps: true,
            ignored_name_prefixes: vec![DEFAULT_JOB_NAME_PREFIX.to_owned()],
            window_hours: 24,
            alert_enabled: true,
            alert_threshold: Severity::High,
        }
    }
}

/// 설정 상한값 상수
const MAX_WINDOW_HOURS: u64 = 8760;

impl IntakeConfig {
    /// core 설정에서 수신 설정을 생성하고 검증합니다.
    pub fn from_core(core: &DeployscanConfig) -> Result<Self, IntakeError> {
        let alert_threshold =
            Severity::from_str_loose(&core.alert.severity_threshold).ok_or_else(|| {
                IntakeError::Config {
                    field: "alert.severity_threshold".to_owned(),
                    reason: format!("unknown severity '{}'", core.alert.severity_threshold),
                }
            })?;

        let mut ignored_name_prefixes = vec![core.scanner.job_name_prefix.to_lowercase()];
        for prefix in &core.intake.ignored_name_prefixes {
            let prefix = prefix.to_lowercase();
            if !ignored_name_prefixes.contains(&prefix) {
                ignored_name_prefixes.push(prefix);
            }
        }

        let config = Self {
            accepted_event_types: core.intake.accepted_event_types.clone(),
            container_groups: core.intake.container_groups,
            container_apps: core.intake.container_apps,
            ignored_name_prefixes,
            window_hours: core.cache.window_hours,
            alert_enabled: core.alert.enabled,
            alert_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IntakeError> {
        if self.accepted_event_types.is_empty()
            || self.accepted_event_types.iter().any(|t| t.trim().is_empty())
        {
            return Err(IntakeError::Config {
                field: "accepted_event_types".to_owned(),
                reason: "must contain at least one non-empty event type".to_owned(),
            });
        }

        if !self.container_groups && !self.container_apps {
            return Err(IntakeError::Config {
                field: "container_groups".to_owned(),
                reason: "at least one container kind must be enabled".to_owned(),
            });
        }

        if self.ignored_name_prefixes.iter().any(|p| p.is_empty()) {
            return Err(IntakeError::Config {
                field: "ignored_name_prefixes".to_owned(),
                reason: "prefixes must not be empty".to_owned(),
            });
        }

        if self.window_hours == 0 || self.window_hours > MAX_WINDOW_HOURS {
            return Err(IntakeError::Config {
                field: "window_hours".to_owned(),
                reason: format!("must be 1-{MAX_WINDOW_HOURS}"),
            });
        }

        Ok(())
    }

    /// 이벤트 타입이 허용 목록에 있는지 확인합니다 (대소문자 무시).
    pub fn accepts_event_type(&self, event_type: &str) -> bool {
        self.accepted_event_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(event_type))
    }

    /// 리소스 이름이 무시 접두어로 시작하는지 확인합니다.
    pub fn ignored_prefix(&self, resource_name: &str) -> Option<&str> {
        let name = resource_name.to_lowercase();
        self.ignored_name_prefixes
            .iter()
            .find(|p| name.starts_with(p.as_str()))
            .map(String::as_str)
    }
}

/// 이벤트 수신 설정 빌더
#[derive(Default)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted_event_types(mut self, types: Vec<String>) -> Self {
        self.config.accepted_event_types = types;
        self
    }

    pub fn container_groups(mut self, enabled: bool) -> Self {
        self.config.container_groups = enabled;
        self
    }

    pub fn container_apps(mut self, enabled: bool) -> Self {
        self.config.container_apps = enabled;
        self
    }

    pub fn ignored_name_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.config.ignored_name_prefixes = prefixes;
        self
    }

    pub fn window_hours(mut self, hours: u64) -> Self {
        self.config.window_hours = hours;
        self
    }

    pub fn alert_enabled(mut self, enabled: bool) -> Self {
        self.config.alert_enabled = enabled;
        self
    }

    pub fn alert_threshold(mut self, threshold: Severity) -> Self {
        self.config.alert_threshold = threshold;
        self
    }

    /// 설정을 검증하고 `IntakeConfig`를 생성합니다.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
