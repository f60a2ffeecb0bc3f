/// Internal content-addressed blob store backed by `sled`. Keys are the
/// BLAKE3 hash of the ciphertext, so `put` is naturally idempotent across
/// identical chunks -- re-uploading the same ciphertext is a no-op write.
use crate::error::{RivaultError, RivaultResult};
use async_trait::async_trait;

use super::BlobStore;

pub struct SledBlobStore {
    tree: sled::Db,
    max_chunk_bytes: usize,
}

impl SledBlobStore {
    pub fn open(path: &std::path::Path, max_chunk_bytes: usize) -> RivaultResult<Self> {
        let tree = sled::open(path)?;
        Ok(Self { tree, max_chunk_bytes })
    }
}

#[async_trait]
impl BlobStore for SledBlobStore {
    async fn put(&self, bytes: &[u8]) -> RivaultResult<String> {
        if bytes.len() > self.max_chunk_bytes {
            return Err(RivaultError::Blob(format!(
                "chunk of {} bytes exceeds max_chunk_bytes {}",
                bytes.len(),
                self.max_chunk_bytes
            )));
        }
        let storage_ref = blake3::hash(bytes).to_hex().to_string();
        self.tree.insert(storage_ref.as_bytes(), bytes)?;
        Ok(storage_ref)
    }

    async fn get(&self, storage_ref: &str) -> RivaultResult<Vec<u8>> {
        match self.tree.get(storage_ref.as_bytes())? {
            Some(value) => Ok(value.to_vec()),
            None => Err(RivaultError::BlobNotFound(storage_ref.to_string())),
        }
    }

    async fn delete(&self, storage_ref: &str) -> RivaultResult<()> {
        self.tree.remove(storage_ref.as_bytes())?;
        Ok(())
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
        let store = SledBlobStore::open(dir.path(), 1024).unwrap();

        let reference = store.put(b"chunk bytes").await.unwrap();
        assert_eq!(store.get(&reference).await.unwrap(), b"chunk bytes");

        store.delete(&reference).await.unwrap();
        assert!(matches!(
            store.get(&reference).await.unwrap_err(),
            RivaultError::BlobNotFound(_)
        ));
    }

    #[tokio::test]
    async fn put_is_idempotent_for_identical_bytes() {
        let dir = TempDir::new().unwrap();
        let store = SledBlobStore::open(dir.path(), 1024).unwrap();

        let a = store.put(b"same").await.unwrap();
        let b = store.put(b"same").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn oversize_chunk_rejected() {
        let dir = TempDir::new().unwrap();
        let store = SledBlobStore::open(dir.path(), 4).unwrap();
        let err = store.put(b"too many bytes").await.unwrap_err();
        assert!(matches!(err, RivaultError::Blob(_)));
    }
}
