//! 내구성 저장소 추상화
//!
//! 캐시와 결과 저장소는 세 가지 저장 연산만 사용합니다.
//!
//! - [`BlobStore`]: 키당 한 번만 쓸 수 있는 객체 저장
//! - [`RowStore`]: 파티션 + 정렬 키 기반 행 upsert 및 범위 조회
//! - [`KeyValueStore`]: 마지막 쓰기가 이기는 키-값 저장 (스캔 캐시)
//!
//! 구현체: [`SqliteStorage`](crate::sqlite::SqliteStorage) (행/키-값은 SQLite, 객체는
//! [`FsStorage`](crate::fs::FsStorage)), [`MemoryStorage`](crate::memory::MemoryStorage)

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// 행 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub partition_key: String,
    pub sort_key: String,
    /// 인덱싱되는 정수 열. [`RowFilter::min_rank`] 조건에 사용합니다.
    #[serde(default)]
    pub rank: i64,
    pub data: serde_json::Value,
}

/// 정렬 키 범위 (`start` 포함, `end` 제외)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl SortRange {
    /// 전체 범위
    pub fn all() -> Self {
        Self::default()
    }

    /// 정렬 키가 범위에 포함되는지 확인합니다.
    pub fn contains(&self, sort_key: &str) -> bool {
        self.start.as_deref().is_none_or(|s| sort_key >= s)
            && self.end.as_deref().is_none_or(|e| sort_key < e)
    }
}

/// 행 조회 조건
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub range: SortRange,
    /// `rank`가 이 값 이상인 행만
    pub min_rank: Option<i64>,
}

impl RowFilter {
    /// 파티션의 모든 행
    pub fn all() -> Self {
        Self::default()
    }

    pub fn range(range: SortRange) -> Self {
        Self {
            range,
            min_rank: None,
        }
    }

    pub fn min_rank(mut self, rank: i64) -> Self {
        self.min_rank = Some(rank);
        self
    }

    /// 행이 조건을 만족하는지 확인합니다.
    pub fn matches(&self, row: &Row) -> bool {
        self.range.contains(&row.sort_key) && self.min_rank.is_none_or(|min| row.rank >= min)
    }
}

/// 추가 전용 객체 저장소
pub trait BlobStore: Send + Sync + 'static {
    /// 새 객체를 씁니다. 키가 이미 있으면 `StoreError::Conflict`입니다.
    fn put_new(
        &self,
        key: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 객체를 읽습니다.
    fn get_blob(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;
}

/// 행 저장소
pub trait RowStore: Send + Sync + 'static {
    /// 행을 삽입하거나 덮어씁니다.
    fn upsert_row(&self, table: &str, row: Row)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 파티션 안에서 조건에 맞는 행을 조회합니다. 결과는 정렬 키 오름차순입니다.
    fn query_rows(
        &self,
        table: &str,
        partition_key: &str,
        filter: &RowFilter,
    ) -> impl Future<Output = Result<Vec<Row>, StoreError>> + Send;
}

/// 키-값 저장소
///
/// `put`은 조건 없는 덮어쓰기입니다. 조건부 쓰기(compare-and-swap)가 필요해지면
/// 이 trait만 교체하면 됩니다.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    fn put(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// 저장 키를 검증합니다.
///
/// 세그먼트는 `/`로 구분되며 각 세그먼트는 비어 있지 않은 `[A-Za-z0-9._-]`이고
/// `.`, `..`은 허용되지 않습니다.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let reject = |reason: &str| StoreError::InvalidKey {
        key: key.to_owned(),
        reason: reason.to_owned(),
    };
    if key.is_empty() {
        return Err(reject("key is empty"));
    }
    for segment in key.split('/') {
        if segment.is_empty() {
            return Err(reject("empty segment"));
        }
        if segment == "." || segment == ".." {
            return Err(reject("relative segment"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(reject("invalid characters"));
        }
    }
    Ok(())
}
