// ===================================================================================================
// Error Handling - Core Error Types
// ===================================================================================================
//
// Structured error types for Rivault, mapped one-to-one onto the HTTP status
// taxonomy described in the engine's request-handling contract. Each variant
// covers one failure category across the metadata engine, the blob adapter,
// and the crypto module; the dispatcher translates these into responses.
// ===================================================================================================

use std::fmt;

/// Crate-wide error type. One variant per taxonomy entry the system
/// distinguishes; each maps to exactly one HTTP status in the dispatcher.
#[derive(Debug)]
pub enum RivaultError {
    /// Referenced id does not resolve to an existing node.
    NotFound(String),
    /// Sibling name collision under the same parent.
    NameConflict(String),
    /// Structural misuse: file used as a parent, move across incompatible types.
    InvalidTarget(String),
    /// Move would create a cycle in the parent graph.
    Cycle(String),
    /// Operation on the system root, or on a locked node without a valid secret.
    Forbidden(String),
    /// Drive quota would be exceeded by this mutation.
    QuotaExceeded { drive_id: String, usage: u64, quota: u64, requested: u64 },
    /// Lock verification failed.
    AuthFailed(String),
    /// AEAD or key-derivation failure. Never distinguishes wrong key from
    /// tampered ciphertext -- both surface identically to the caller.
    Crypto(String),
    /// Blob adapter failure: unavailability, oversize payloads, or storage errors.
    Blob(String),
    /// Blob adapter reported the reference as missing.
    BlobNotFound(String),
    /// Storage-layer failure (sled, filesystem) not otherwise categorized.
    Storage(String),
    /// Malformed request input.
    BadRequest(String),
    /// Invariant violation or other internal failure.
    Internal(String),
}

impl fmt::Display for RivaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RivaultError::NotFound(msg) => write!(f, "not found: {}", msg),
            RivaultError::NameConflict(msg) => write!(f, "name conflict: {}", msg),
            RivaultError::InvalidTarget(msg) => write!(f, "invalid target: {}", msg),
            RivaultError::Cycle(msg) => write!(f, "cycle: {}", msg),
            RivaultError::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            RivaultError::QuotaExceeded { drive_id, usage, quota, requested } => write!(
                f,
                "quota exceeded on drive {}: {} used, {} requested, {} limit",
                drive_id, usage, requested, quota
            ),
            RivaultError::AuthFailed(msg) => write!(f, "authentication failed: {}", msg),
            RivaultError::Crypto(msg) => write!(f, "crypto error: {}", msg),
            RivaultError::Blob(msg) => write!(f, "blob error: {}", msg),
            RivaultError::BlobNotFound(msg) => write!(f, "blob not found: {}", msg),
            RivaultError::Storage(msg) => write!(f, "storage error: {}", msg),
            RivaultError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            RivaultError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for RivaultError {}

impl From<sled::Error> for RivaultError {
    fn from(e: sled::Error) -> Self {
        RivaultError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RivaultError {
    fn from(e: serde_json::Error) -> Self {
        RivaultError::Storage(format!("serialization failure: {}", e))
    }
}

impl From<std::io::Error> for RivaultError {
    fn from(e: std::io::Error) -> Self {
        RivaultError::Storage(e.to_string())
    }
}

pub type RivaultResult<T> = Result<T, RivaultError>;
