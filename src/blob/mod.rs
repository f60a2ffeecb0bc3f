// ===================================================================================================
// Blob Adapter (C2) - Opaque Byte-Bag Storage
// ===================================================================================================
//
// The core has no semantic knowledge of what a chunk contains; it only calls
// put/get/delete against a storage reference. Two implementations coexist, as
// the design calls for, and the rest of the system depends only on the
// `BlobStore` trait object.
// ===================================================================================================

pub mod fs_store;
pub mod sled_store;

use crate::error::RivaultResult;
use async_trait::async_trait;

pub use fs_store::FilesystemBlobStore;
pub use sled_store::SledBlobStore;

/// Default maximum chunk payload size accepted by a blob adapter (20 MiB).
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 20 * 1024 * 1024;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store opaque bytes, returning a reference the caller must keep to
    /// retrieve or delete them later. Fails if `bytes.len()` exceeds this
    /// store's configured `max_chunk_bytes`.
    async fn put(&self, bytes: &[u8]) -> RivaultResult<String>;

    /// Retrieve previously stored bytes by reference.
    async fn get(&self, storage_ref: &str) -> RivaultResult<Vec<u8>>;

    /// Best-effort delete. Callers treat failures as non-fatal and log them;
    /// implementations still return a `Result` so callers can choose to log it.
    async fn delete(&self, storage_ref: &str) -> RivaultResult<()>;

    fn max_chunk_bytes(&self) -> usize;
}
