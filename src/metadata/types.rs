use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One encrypted slice of a file, as recorded in that file's chunk list.
/// Per-chunk IV and auth tag live in the chunk payload itself, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRef {
    pub order: u32,
    pub storage_ref: String,
}

/// Hex-encoded AEAD record, used both for the wrapped data key and (by the
/// caller, not this engine) for chunk bodies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedHex {
    pub iv: String,
    pub ciphertext: String,
    pub auth_tag: String,
}

/// Per-file envelope-encryption metadata: the salt used to derive the
/// client's master key, and that file's data key wrapped under it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptionHeader {
    pub salt: String,
    pub wrapped_key: SealedHex,
}

/// Variant-specific fields for each node kind. The discriminator is carried
/// by serde's internal tag so the on-disk/over-the-wire form matches the
/// persisted state layout: `folder` | `drive` | `file` | `system_root`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    SystemRoot,
    Drive {
        quota: u64,
        usage: u64,
        #[serde(default)]
        hidden: bool,
        #[serde(default)]
        access_code: Option<String>,
    },
    Folder,
    File {
        size: u64,
        chunk_size: u64,
        mime_type: String,
        updated_at: DateTime<Utc>,
        #[serde(default)]
        chunks: Vec<ChunkRef>,
        #[serde(default)]
        encryption: Option<EncryptionHeader>,
    },
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::SystemRoot => "system_root",
            NodeKind::Drive { .. } => "drive",
            NodeKind::Folder => "folder",
            NodeKind::File { .. } => "file",
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File { .. })
    }

    pub fn can_have_children(&self) -> bool {
        matches!(self, NodeKind::SystemRoot | NodeKind::Drive { .. } | NodeKind::Folder)
    }
}

/// Any element of the hierarchical tree: SystemRoot, Drive, Folder, or File.
/// Identity fields are shared across variants; `kind` carries the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_secret: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    /// A copy suitable for returning to a client: the lock secret is never
    /// exposed on listing operations.
    pub fn redacted(&self) -> Node {
        let mut copy = self.clone();
        copy.lock_secret = None;
        copy
    }
}

/// Aggregate per-user usage counters, kept consistent with every structural
/// mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_used: u64,
    pub file_count: u32,
    pub folder_count: u32,
}
