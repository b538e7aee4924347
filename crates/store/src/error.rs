//! 저장소 에러 타입
//!
//! [`StoreError`]는 캐시와 결과 저장소에서 발생하는 모든 에러를 표현합니다.
//! `From<StoreError> for DeployscanError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use deployscan_core::error::{DeployscanError, StorageError};

/// 저장소 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 백엔드 I/O 실패
    #[error("storage io error at '{key}': {reason}")]
    Io {
        /// 대상 키 또는 경로
        key: String,
        /// 실패 사유
        reason: String,
    },

    /// 직렬화/역직렬화 실패
    #[error("serialization error: {0}")]
    Serialization(String),

    /// SQLite 질의 실패
    #[error("database error: {0}")]
    Database(String),

    /// 추가 전용 키에 이미 값이 존재
    #[error("object already exists: {0}")]
    Conflict(String),

    /// 허용되지 않는 키 형식
    #[error("invalid storage key '{key}': {reason}")]
    InvalidKey {
        /// 문제가 된 키
        key: String,
        /// 거부 사유
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

impl StoreError {
    pub(crate) fn io(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            key: key.into(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<StoreError> for DeployscanError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config { field, reason } => {
                DeployscanError::Config(deployscan_core::ConfigError::InvalidValue { field, reason })
            }
            StoreError::Database(reason) => {
                DeployscanError::Storage(StorageError::Query(reason))
            }
            other => DeployscanError::Storage(StorageError::Write(other.to_string())),
        }
    }
}
