#![doc = include_str!("../README.md")]

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod partition;
pub mod result_store;
pub mod sqlite;
pub mod storage;

// --- Public API Re-exports ---

pub use backend::{BlobStore, KeyValueStore, Row, RowFilter, RowStore, SortRange};
pub use cache::{ScanCache, ScanCacheEntry};
pub use config::{BackendKind, StoreConfig, StoreConfigBuilder};
pub use error::StoreError;
pub use fs::FsStorage;
pub use memory::MemoryStorage;
pub use partition::partition_key;
pub use result_store::{
    ResultStore, ScanErrorKind, ScanErrorRecord, ScanQuery, ScanSummary, StoredScanError,
};
pub use sqlite::SqliteStorage;
pub use storage::Storage;
