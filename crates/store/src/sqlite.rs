//! SQLite 저장소 백엔드
//!
//! 요약 행과 캐시 엔트리는 SQLite에, 결과 원문 객체는 같은 루트 아래 파일시스템에 둡니다.
//!
//! ```text
//! {root}/deployscan.db   store_rows, store_kv 테이블
//! {root}/blobs/{key}     결과 원문, 에러 기록
//! ```
//!
//! 파티션, 정렬 키 범위, 최소 순위 조건은 모두 인덱스를 타는 `WHERE` 절로 처리합니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::Row as _;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::backend::{BlobStore, KeyValueStore, Row, RowFilter, RowStore, validate_key};
use crate::error::StoreError;
use crate::fs::FsStorage;

/// 데이터베이스 파일명
pub const DB_FILE: &str = "deployscan.db";
/// 객체 디렉토리명
pub const BLOB_DIR: &str = "blobs";

const MAX_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS store_rows (
        tbl TEXT NOT NULL,
        partition_key TEXT NOT NULL,
        sort_key TEXT NOT NULL,
        rank_value INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL,
        PRIMARY KEY (tbl, partition_key, sort_key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_store_rows_rank ON store_rows(tbl, partition_key, rank_value)",
    r#"
    CREATE TABLE IF NOT EXISTS store_kv (
        kv_key TEXT PRIMARY KEY,
        kv_value BLOB NOT NULL
    )
    "#,
];

const UPSERT_ROW: &str = r#"
    INSERT INTO store_rows (tbl, partition_key, sort_key, rank_value, data)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT (tbl, partition_key, sort_key)
    DO UPDATE SET rank_value = excluded.rank_value, data = excluded.data
"#;

const QUERY_ROWS: &str = r#"
    SELECT sort_key, rank_value, data FROM store_rows
    WHERE tbl = ?1 AND partition_key = ?2
      AND (?3 IS NULL OR sort_key >= ?3)
      AND (?4 IS NULL OR sort_key < ?4)
      AND (?5 IS NULL OR rank_value >= ?5)
    ORDER BY sort_key
"#;

const GET_KV: &str = "SELECT kv_value FROM store_kv WHERE kv_key = ?1";

const PUT_KV: &str = r#"
    INSERT INTO store_kv (kv_key, kv_value) VALUES (?1, ?2)
    ON CONFLICT (kv_key) DO UPDATE SET kv_value = excluded.kv_value
"#;

/// SQLite + 파일시스템 저장소
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    blobs: FsStorage,
    db_path: PathBuf,
}

impl SqliteStorage {
    /// 루트 디렉토리 아래 데이터베이스를 열고 스키마를 준비합니다.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let blobs = FsStorage::new(root.join(BLOB_DIR));
        blobs.ensure_root().await?;

        let db_path = root.join(DB_FILE);
        let existed = tokio::fs::try_exists(&db_path).await.unwrap_or(false);
        info!(path = %db_path.display(), existed, "opening scan database");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(format!("{}: {e}", db_path.display())))?;

        for statement in SCHEMA {
            sqlx::query(*statement).execute(&pool).await?;
        }
        debug!(path = %db_path.display(), "scan database schema ready");

        Ok(Self {
            pool,
            blobs,
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 테이블의 전체 행 수
    pub async fn row_count(&self, table: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM store_rows WHERE tbl = ?1")
            .bind(table)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// 연결 풀을 닫습니다.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl BlobStore for SqliteStorage {
    async fn put_new(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.blobs.put_new(key, body).await
    }

    async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.blobs.get_blob(key).await
    }
}

impl RowStore for SqliteStorage {
    async fn upsert_row(&self, table: &str, row: Row) -> Result<(), StoreError> {
        validate_key(table)?;
        let data = serde_json::to_string(&row.data)?;
        sqlx::query(UPSERT_ROW)
            .bind(table)
            .bind(&row.partition_key)
            .bind(&row.sort_key)
            .bind(row.rank)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query_rows(
        &self,
        table: &str,
        partition_key: &str,
        filter: &RowFilter,
    ) -> Result<Vec<Row>, StoreError> {
        validate_key(table)?;
        let records = sqlx::query(QUERY_ROWS)
            .bind(table)
            .bind(partition_key)
            .bind(filter.range.start.as_deref())
            .bind(filter.range.end.as_deref())
            .bind(filter.min_rank)
            .fetch_all(&self.pool)
            .await?;

        records
            .into_iter()
            .map(|record| -> Result<Row, StoreError> {
                let data: String = record.try_get("data")?;
                Ok(Row {
                    partition_key: partition_key.to_owned(),
                    sort_key: record.try_get("sort_key")?,
                    rank: record.try_get("rank_value")?,
                    data: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }
}

impl KeyValueStore for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        let record = sqlx::query(GET_KV)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match record {
            Some(record) => Ok(Some(record.try_get("kv_value")?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        validate_key(key)?;
        sqlx::query(PUT_KV)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
