//! 설정으로 선택하는 저장소 백엔드

use crate::backend::{BlobStore, KeyValueStore, Row, RowFilter, RowStore};
use crate::config::{BackendKind, StoreConfig};
use crate::error::StoreError;
use crate::memory::MemoryStorage;
use crate::sqlite::SqliteStorage;

/// 런타임에 선택되는 저장소 백엔드
#[derive(Debug, Clone)]
pub enum Storage {
    Sqlite(SqliteStorage),
    Memory(MemoryStorage),
}

impl Storage {
    /// 설정에 맞는 백엔드를 생성합니다. SQLite 백엔드는 루트 디렉토리와 스키마를 준비합니다.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        match config.backend {
            BackendKind::Sqlite => Ok(Self::Sqlite(SqliteStorage::open(&config.path).await?)),
            BackendKind::Memory => Ok(Self::Memory(MemoryStorage::new())),
        }
    }
}

impl BlobStore for Storage {
    async fn put_new(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(s) => s.put_new(key, body).await,
            Self::Memory(s) => s.put_new(key, body).await,
        }
    }

    async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Self::Sqlite(s) => s.get_blob(key).await,
            Self::Memory(s) => s.get_blob(key).await,
        }
    }
}

impl RowStore for Storage {
    async fn upsert_row(&self, table: &str, row: Row) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(s) => s.upsert_row(table, row).await,
            Self::Memory(s) => s.upsert_row(table, row).await,
        }
    }

    async fn query_rows(
        &self,
        table: &str,
        partition_key: &str,
        filter: &RowFilter,
    ) -> Result<Vec<Row>, StoreError> {
        match self {
            Self::Sqlite(s) => s.query_rows(table, partition_key, filter).await,
            Self::Memory(s) => s.query_rows(table, partition_key, filter).await,
        }
    }
}

impl KeyValueStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Self::Sqlite(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(s) => s.put(key, value).await,
            Self::Memory(s) => s.put(key, value).await,
        }
    }
}
