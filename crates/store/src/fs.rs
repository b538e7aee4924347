//! 파일시스템 객체 저장소
//!
//! 결과 원문과 에러 기록 객체를 `{root}/{key}` 경로에 저장합니다.
//! 객체는 임시 파일에 쓴 뒤 hard link로 게시하여 이미 존재하는 키를 덮어쓰지 않습니다.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{BlobStore, validate_key};
use crate::error::StoreError;

/// 파일시스템 객체 저장소
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 루트 디렉토리를 생성합니다.
    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::io(self.root.display().to_string(), e))
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

/// 같은 디렉토리에 임시 파일을 쓰고 경로를 반환합니다.
async fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf, StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent.display().to_string(), e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp-{}", Uuid::new_v4().simple()));

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(tmp.display().to_string(), e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StoreError::io(tmp.display().to_string(), e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::io(tmp.display().to_string(), e))?;
    drop(file);
    Ok(tmp)
}

impl BlobStore for FsStorage {
    async fn put_new(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let path = self.blob_path(key)?;
        let tmp = write_temp(&path, &body).await?;

        // hard_link는 대상이 이미 있으면 실패하므로 기존 객체를 덮어쓰지 않음
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => {
                debug!(key, bytes = body.len(), "blob written");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::Conflict(key.to_owned()))
            }
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.blob_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path.display().to_string(), e)),
        }
    }
}
