//! 스캔 잡 에러 타입
//!
//! [`ScanJobError`]는 스캔 잡 실행과 실행 플랫폼 호출에서 발생하는 에러를 표현합니다.
//! `From<ScanJobError> for DeployscanError` 변환이 구현되어 있습니다.

use deployscan_core::error::{ConfigError, DeployscanError, ScanJobFailure};

/// 스캔 잡 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScanJobError {
    /// 실행 단위를 생성하지 못함 (쿼터, 이미지 풀 실패, 잘못된 자격 증명)
    #[error("provisioning failed for '{unit}': {reason}")]
    Provisioning {
        /// 실행 단위 이름
        unit: String,
        /// 실패 사유
        reason: String,
    },

    /// 제한 시간 초과
    #[error("scan job '{unit}' timed out after {elapsed_secs}s")]
    TimedOut {
        /// 실행 단위 이름
        unit: String,
        /// 경과 시간 (초)
        elapsed_secs: u64,
    },

    /// 스캐너 출력에서 JSON을 찾지 못함
    #[error("scanner output of '{unit}' contains no JSON object ({} bytes)", raw_output.len())]
    Unparseable {
        /// 실행 단위 이름
        unit: String,
        /// 감사용 원문 로그
        raw_output: String,
    },

    /// 실행 단위를 찾을 수 없음
    #[error("execution unit not found: {0}")]
    UnitNotFound(String),

    /// 실행 플랫폼 API 호출 실패
    #[error("execution platform error: {0}")]
    Platform(String),

    /// 비밀 저장소에서 자격 증명을 읽지 못함
    #[error("credential '{name}' unavailable: {reason}")]
    Credentials {
        /// 비밀 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<ScanJobError> for DeployscanError {
    fn from(err: ScanJobError) -> Self {
        match err {
            ScanJobError::Provisioning { .. } => {
                DeployscanError::ScanJob(ScanJobFailure::Provisioning(err.to_string()))
            }
            ScanJobError::TimedOut { .. } => {
                DeployscanError::ScanJob(ScanJobFailure::Timeout(err.to_string()))
            }
            ScanJobError::Unparseable { .. } => {
                DeployscanError::ScanJob(ScanJobFailure::OutputParse(err.to_string()))
            }
            ScanJobError::Config { field, reason } => {
                DeployscanError::Config(ConfigError::InvalidValue { field, reason })
            }
            other => DeployscanError::ScanJob(ScanJobFailure::Platform(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_display_does_not_dump_output() {
        let err = ScanJobError::Unparseable {
            unit: "dscan-nginx-1".to_owned(),
            raw_output: "x".repeat(10_000),
        };
        let msg = err.to_string();
        assert!(msg.contains("10000 bytes"));
        assert!(msg.len() < 200);
    }

    #[test]
    fn converts_to_top_level() {
        let err: DeployscanError = ScanJobError::TimedOut {
            unit: "dscan-a".to_owned(),
            elapsed_secs: 1800,
        }
        .into();
        assert!(matches!(
            err,
            DeployscanError::ScanJob(ScanJobFailure::Timeout(_))
        ));

        let err: DeployscanError = ScanJobError::Platform("boom".to_owned()).into();
        assert!(matches!(
            err,
            DeployscanError::ScanJob(ScanJobFailure::Platform(_))
        ));
    }

    #[test]
    fn credential_error_names_secret_only() {
        let err = ScanJobError::Credentials {
            name: "qualys-access-token".to_owned(),
            reason: "not set".to_owned(),
        };
        assert!(err.to_string().contains("qualys-access-token"));
    }
}
