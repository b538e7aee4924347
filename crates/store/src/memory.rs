//! 인메모리 저장소 백엔드
//!
//! 테스트와 `--backend memory` 일회성 실행에 사용합니다.
//! 복제본은 같은 저장 공간을 공유합니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::backend::{BlobStore, KeyValueStore, Row, RowFilter, RowStore, validate_key};
use crate::error::StoreError;

type Partition = BTreeMap<String, Row>;

/// 인메모리 저장소
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    tables: Arc<RwLock<HashMap<String, HashMap<String, Partition>>>>,
    kv: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 객체 수
    pub async fn blob_count(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// 지정한 접두어로 시작하는 객체 키 목록 (정렬됨)
    pub async fn blob_keys(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// 테이블의 전체 행 수
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map_or(0, |t| t.values().map(BTreeMap::len).sum())
    }
}

impl BlobStore for MemoryStorage {
    async fn put_new(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(key) {
            return Err(StoreError::Conflict(key.to_owned()));
        }
        blobs.insert(key.to_owned(), body);
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        Ok(self.blobs.read().await.get(key).cloned())
    }
}

impl RowStore for MemoryStorage {
    async fn upsert_row(&self, table: &str, row: Row) -> Result<(), StoreError> {
        validate_key(table)?;
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_owned())
            .or_default()
            .entry(row.partition_key.clone())
            .or_default()
            .insert(row.sort_key.clone(), row);
        Ok(())
    }

    async fn query_rows(
        &self,
        table: &str,
        partition_key: &str,
        filter: &RowFilter,
    ) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .and_then(|t| t.get(partition_key))
            .map(|p| {
                p.values()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.kv.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.kv.write().await.insert(key.to_owned(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SortRange;

    fn row(partition: &str, sort: &str) -> Row {
        Row {
            partition_key: partition.to_owned(),
            sort_key: sort.to_owned(),
            rank: 0,
            data: serde_json::json!({ "sort": sort }),
        }
    }

    #[tokio::test]
    async fn blob_is_append_only() {
        let storage = MemoryStorage::new();
        storage.put_new("a/b.json", b"one".to_vec()).await.unwrap();
        let err = storage.put_new("a/b.json", b"two".to_vec()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(storage.get_blob("a/b.json").await.unwrap().unwrap(), b"one");
    }

    #[tokio::test]
    async fn rows_queried_in_sort_order() {
        let storage = MemoryStorage::new();
        storage.upsert_row("scans", row("p", "0003")).await.unwrap();
        storage.upsert_row("scans", row("p", "0001")).await.unwrap();
        storage.upsert_row("scans", row("p", "0002")).await.unwrap();
        storage.upsert_row("scans", row("q", "0001")).await.unwrap();

        let rows = storage
            .query_rows("scans", "p", &RowFilter::all())
            .await
            .unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["0001", "0002", "0003"]);

        let range = SortRange {
            start: Some("0002".to_owned()),
            end: None,
        };
        let filter = RowFilter::range(range);
        assert_eq!(storage.query_rows("scans", "p", &filter).await.unwrap().len(), 2);
        assert_eq!(storage.row_count("scans").await, 4);
    }

    #[tokio::test]
    async fn upsert_overwrites_same_key() {
        let storage = MemoryStorage::new();
        storage.upsert_row("t", row("p", "1")).await.unwrap();
        let mut replaced = row("p", "1");
        replaced.data = serde_json::json!({ "v": 2 });
        storage.upsert_row("t", replaced.clone()).await.unwrap();
        let rows = storage.query_rows("t", "p", &RowFilter::all()).await.unwrap();
        assert_eq!(rows, vec![replaced]);
    }

    #[tokio::test]
    async fn rows_filtered_by_rank() {
        let storage = MemoryStorage::new();
        for (sort, rank) in [("0001", 0), ("0002", 5), ("0003", 3)] {
            let mut r = row("p", sort);
            r.rank = rank;
            storage.upsert_row("scans", r).await.unwrap();
        }
        let rows = storage
            .query_rows("scans", "p", &RowFilter::all().min_rank(3))
            .await
            .unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["0002", "0003"]);
    }

    #[tokio::test]
    async fn kv_last_writer_wins_and_clones_share_state() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();
        storage.put("k", b"1".to_vec()).await.unwrap();
        clone.put("k", b"2".to_vec()).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().unwrap(), b"2");
        assert!(storage.get("missing").await.unwrap().is_none());
    }
}
