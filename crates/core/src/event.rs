//! 이벤트 — 컴포넌트가 외부로 내보내는 메시지의 기본 단위
//!
//! [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는 추적 정보이며,
//! 스캔을 유발한 배포 이벤트 ID를 `trace_id`로 유지하여
//! 결과와 알림을 원래 이벤트까지 추적할 수 있게 합니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::{Severity, VulnerabilityCounts};

// --- 모듈명 상수 ---

/// 이벤트 수신 모듈명
pub const MODULE_INTAKE: &str = "intake";

// --- 이벤트 타입 상수 ---

/// 알림 이벤트 타입
pub const EVENT_TYPE_ALERT: &str = "alert";

/// 이벤트 메타데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 분산 추적 ID (배포 이벤트 ID)
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        write!(
            f,
            "[{secs}] source={} trace={}",
            self.source_module, self.trace_id
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널 전송이 가능합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명
    fn event_type(&self) -> &str;
}

/// 스캔 결과가 알림 기준을 넘었을 때 생성되는 알림
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// 이벤트 고유 ID
    pub id: String,
    pub metadata: EventMetadata,
    /// 정규 이미지 식별자
    pub image: String,
    pub scan_id: String,
    /// 발견된 가장 높은 심각도
    pub severity: Severity,
    pub counts: VulnerabilityCounts,
    /// 사람이 읽을 수 있는 요약
    pub summary: String,
    /// 결과 저장 위치
    pub result_location: String,
}

impl AlertEvent {
    /// 배포 이벤트 ID를 trace_id로 사용하는 알림을 생성합니다.
    pub fn for_scan(
        image: impl Into<String>,
        scan_id: impl Into<String>,
        severity: Severity,
        counts: VulnerabilityCounts,
        result_location: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        let image = image.into();
        let summary = format!("{severity} vulnerabilities found in {image}: {counts}");
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_INTAKE, trace_id),
            image,
            scan_id: scan_id.into(),
            severity,
            counts,
            summary,
            result_location: result_location.into(),
        }
    }
}

impl Event for AlertEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_ALERT
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AlertEvent[{}] image={} severity={} scan={}",
            &self.id[..8.min(self.id.len())],
            self.image,
            self.severity,
            self.scan_id,
        )
    }
}
