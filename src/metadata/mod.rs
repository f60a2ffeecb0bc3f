// ===================================================================================================
// Metadata Engine (C3)
// ===================================================================================================
//
// The hierarchical filesystem: drives, folders, and files, with quota
// accounting and per-node locks. See engine.rs for the operation set and
// types.rs for the on-disk node representation.
// ===================================================================================================

pub mod engine;
pub mod types;

pub use engine::{CreateFileRequest, MetadataEngine};
pub use types::{ChunkRef, EncryptionHeader, Node, NodeKind, SealedHex, Stats};
