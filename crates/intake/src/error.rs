//! 이벤트 수신 에러 타입
//!
//! [`IntakeError`]는 배포 이벤트 파싱과 이미지별 파이프라인에서 발생하는 에러를 표현합니다.

use deployscan_core::error::{ConfigError, DeployscanError};
use deployscan_scan_job::ScanJobError;
use deployscan_store::StoreError;

/// 이벤트 수신 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// 이벤트 본문이 배포 이벤트 형식이 아님
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// 컨테이너 이미지 조회 실패
    #[error("container lookup failed for {target}: {reason}")]
    Lookup {
        /// 조회 대상 리소스
        target: String,
        /// 실패 사유
        reason: String,
    },

    /// 결과 저장 실패 (재전달 필요)
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 스캔 잡 구성 실패
    #[error("scan job error: {0}")]
    ScanJob(#[from] ScanJobError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<IntakeError> for DeployscanError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Store(e) => e.into(),
            IntakeError::ScanJob(e) => e.into(),
            IntakeError::Config { field, reason } => {
                DeployscanError::Config(ConfigError::InvalidValue { field, reason })
            }
            other => DeployscanError::Intake(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_event_maps_to_intake() {
        let err: DeployscanError = IntakeError::MalformedEvent("missing subject".to_owned()).into();
        assert!(matches!(err, DeployscanError::Intake(ref msg) if msg.contains("missing subject")));
    }

    #[test]
    fn config_maps_to_invalid_value() {
        let err: DeployscanError = IntakeError::Config {
            field: "window_hours".to_owned(),
            reason: "must be 1-8760".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            DeployscanError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn store_error_converts() {
        let err: IntakeError = StoreError::Conflict("results/x".to_owned()).into();
        assert!(matches!(err, IntakeError::Store(_)));
        let top: DeployscanError = err.into();
        assert!(matches!(top, DeployscanError::Storage(_)));
    }
}
