//! 저장소 설정
//!
//! [`StoreConfig`]는 core의 `[storage]`, `[cache]` 섹션을 합쳐
//! 캐시와 결과 저장소가 사용하는 설정을 제공합니다.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// 저장소 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite 데이터베이스 + 파일시스템 객체
    Sqlite,
    /// 프로세스 메모리 (테스트, 일회성 실행)
    Memory,
}

impl BackendKind {
    /// 설정 문자열을 파싱합니다.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// SQLite 백엔드 루트 디렉토리 (데이터베이스 파일과 객체 디렉토리)
    pub path: String,
    /// 재스캔 억제 기간 (시간)
    pub window_hours: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            path: "/var/lib/deployscan/store".to_owned(),
            window_hours: 24,
        }
    }
}

/// 재스캔 억제 기간 상한 (1년)
const MAX_WINDOW_HOURS: u64 = 8760;

impl StoreConfig {
    /// core 설정에서 저장소 설정을 생성합니다.
    pub fn from_core(
        storage: &deployscan_core::config::StorageConfig,
        cache: &deployscan_core::config::CacheConfig,
    ) -> Result<Self, StoreError> {
        let backend = BackendKind::parse(&storage.backend).ok_or_else(|| StoreError::Config {
            field: "backend".to_owned(),
            reason: format!("unknown backend '{}'", storage.backend),
        })?;
        Ok(Self {
            backend,
            path: storage.path.clone(),
            window_hours: cache.window_hours,
        })
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.window_hours == 0 || self.window_hours > MAX_WINDOW_HOURS {
            return Err(StoreError::Config {
                field: "window_hours".to_owned(),
                reason: format!("must be 1-{MAX_WINDOW_HOURS}"),
            });
        }
        if self.backend == BackendKind::Sqlite && self.path.trim().is_empty() {
            return Err(StoreError::Config {
                field: "path".to_owned(),
                reason: "path must not be empty for the sqlite backend".to_owned(),
            });
        }
        Ok(())
    }
}

/// 저장소 설정 빌더
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    pub fn window_hours(mut self, hours: u64) -> Self {
        self.config.window_hours = hours;
        self
    }

    /// 설정을 검증하고 반환합니다.
    pub fn build(self) -> Result<StoreConfig, StoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
