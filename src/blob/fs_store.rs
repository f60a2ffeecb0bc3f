/// Filesystem-backed blob store: the second independent backend, writing
/// each chunk to `{root}/{ref}` where `ref` is a random UUID. Demonstrates
/// that the core genuinely does not depend on the blob backend's structure.
use crate::error::{RivaultError, RivaultResult};
use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

use super::BlobStore;

pub struct FilesystemBlobStore {
    root: PathBuf,
    max_chunk_bytes: usize,
}

impl FilesystemBlobStore {
    pub fn new(root: PathBuf, max_chunk_bytes: usize) -> RivaultResult<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, max_chunk_bytes })
    }

    fn path_for(&self, storage_ref: &str) -> RivaultResult<PathBuf> {
        if storage_ref.contains('/') || storage_ref.contains("..") {
            return Err(RivaultError::BadRequest("invalid storage reference".to_string()));
        }
        Ok(self.root.join(storage_ref))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, bytes: &[u8]) -> RivaultResult<String> {
        if bytes.len() > self.max_chunk_bytes {
            return Err(RivaultError::Blob(format!(
                "chunk of {} bytes exceeds max_chunk_bytes {}",
                bytes.len(),
                self.max_chunk_bytes
            )));
        }
        let storage_ref = Uuid::new_v4().to_string();
        let path = self.path_for(&storage_ref)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| RivaultError::Blob(format!("write failed: {}", e)))?;
        Ok(storage_ref)
    }

    async fn get(&self, storage_ref: &str) -> RivaultResult<Vec<u8>> {
        let path = self.path_for(storage_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RivaultError::BlobNotFound(storage_ref.to_string()))
            }
            Err(e) => Err(RivaultError::Blob(e.to_string())),
        }
    }

    async fn delete(&self, storage_ref: &str) -> RivaultResult<()> {
        let path = self.path_for(storage_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    fn max_chunk_bytes(&self) -> usize {
        self.max_chunk_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(dir.path().join("blobs"), 1024).unwrap();

        let reference = store.put(b"chunk bytes").await.unwrap();
        assert_eq!(store.get(&reference).await.unwrap(), b"chunk bytes");

        store.delete(&reference).await.unwrap();
        assert!(matches!(
            store.get(&reference).await.unwrap_err(),
            RivaultError::BlobNotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_missing_ref_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(dir.path().join("blobs"), 1024).unwrap();
        store.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_path_traversal_refs() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(dir.path().join("blobs"), 1024).unwrap();
        let err = store.get("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, RivaultError::BadRequest(_)));
    }
}
