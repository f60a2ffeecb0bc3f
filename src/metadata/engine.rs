// ===================================================================================================
// Metadata Engine (C3) - Hierarchical Node Store
// ===================================================================================================
//
// Backed by one `sled` database per user, with the literal keyspace the
// design calls for: `root`, `node:{id}`, `children:{parent_id}`, `stats`,
// `system_version`. Every mutating method here assumes it runs inside this
// user's actor -- the actor's serial message loop is what makes a
// multi-key read-modify-write sequence atomic, so no locking happens inside
// the engine itself (see the per-user actor in `crate::actor`).
// ===================================================================================================

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RivaultError, RivaultResult};
use crate::metadata::types::{ChunkRef, EncryptionHeader, Node, NodeKind, Stats};

const SYSTEM_VERSION: u32 = 1;
const ROOT_ALIAS: &str = "root";

fn key_root() -> &'static [u8] {
    b"root"
}
fn key_node(id: &str) -> Vec<u8> {
    format!("node:{}", id).into_bytes()
}
fn key_children(id: &str) -> Vec<u8> {
    format!("children:{}", id).into_bytes()
}
fn key_stats() -> &'static [u8] {
    b"stats"
}
fn key_system_version() -> &'static [u8] {
    b"system_version"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub encryption: Option<EncryptionHeader>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

pub fn default_chunk_size() -> u64 {
    5 * 1024 * 1024
}

pub struct MetadataEngine {
    db: sled::Db,
    default_drive_quota: u64,
}

impl MetadataEngine {
    /// Open (or create) this user's metadata database and run the
    /// initialization/migration protocol if it hasn't run yet.
    pub fn open(path: &std::path::Path, default_drive_quota: u64) -> RivaultResult<Self> {
        let db = sled::open(path)?;
        let engine = MetadataEngine { db, default_drive_quota };
        engine.init_if_needed()?;
        Ok(engine)
    }

    fn init_if_needed(&self) -> RivaultResult<()> {
        let version: Option<u32> = self.get_json(key_system_version())?;
        if version.unwrap_or(0) >= SYSTEM_VERSION {
            if self.get_json::<Stats>(key_stats())?.is_none() {
                self.rebuild_stats()?;
            }
            return Ok(());
        }

        match self.db.get(key_root())? {
            Some(bytes) => {
                let legacy_root_id = String::from_utf8(bytes.to_vec())
                    .map_err(|e| RivaultError::Internal(format!("corrupt root pointer: {}", e)))?;
                self.migrate_legacy_root(&legacy_root_id)?;
            }
            None => self.create_fresh_root()?,
        }

        self.put_json(key_system_version(), &SYSTEM_VERSION)?;
        Ok(())
    }

    fn create_fresh_root(&self) -> RivaultResult<()> {
        let root_id = Uuid::new_v4().to_string();
        let root_node = Node {
            id: root_id.clone(),
            parent_id: None,
            name: "root".to_string(),
            created_at: Utc::now(),
            locked: false,
            lock_secret: None,
            kind: NodeKind::SystemRoot,
        };
        self.put_node(&root_node)?;
        self.db.insert(key_root(), root_id.as_bytes())?;

        let drive_id = Uuid::new_v4().to_string();
        let drive_node = Node {
            id: drive_id.clone(),
            parent_id: Some(root_id.clone()),
            name: "Local Disk (C:)".to_string(),
            created_at: Utc::now(),
            locked: false,
            lock_secret: None,
            kind: NodeKind::Drive {
                quota: self.default_drive_quota,
                usage: 0,
                hidden: false,
                access_code: None,
            },
        };
        self.put_node(&drive_node)?;
        self.put_children(&root_id, &[drive_id.clone()])?;
        self.put_children(&drive_id, &[])?;

        self.put_stats(Stats { total_used: 0, file_count: 0, folder_count: 2 })
    }

    /// Pre-v1 stores have no `system_version` key and a `root` pointer at a
    /// single Folder acting as a flat root -- a record with no `type` tag
    /// (the persisted-layout rule: absence of the discriminator implies a
    /// legacy folder). `NodeKind`'s internally-tagged representation can't
    /// deserialize that record directly, so it's parsed as raw JSON first.
    ///
    /// Reparents it under a fresh SystemRoot and relabels its kind to the
    /// default Drive, preserving its id (so any stored child references
    /// elsewhere in the tree stay valid), name, and creation time. Only the
    /// root record itself is assumed untagged; every other node already
    /// deserializes as `NodeKind` once the root is fixed up.
    fn migrate_legacy_root(&self, legacy_root_id: &str) -> RivaultResult<()> {
        let raw = self
            .db
            .get(key_node(legacy_root_id))?
            .ok_or_else(|| RivaultError::Internal(format!("pre-v1 root {} has no node record", legacy_root_id)))?;
        let value: serde_json::Value = serde_json::from_slice(&raw)?;

        if value.get("type").is_some() {
            // Already tagged; only the version marker was missing, e.g. an
            // interrupted prior run. Nothing to reparent.
            return Ok(());
        }

        let name = value.get("name").and_then(|v| v.as_str()).unwrap_or("Local Disk (C:)").to_string();
        let created_at = value
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<chrono::DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);

        let new_root_id = Uuid::new_v4().to_string();
        let new_root = Node {
            id: new_root_id.clone(),
            parent_id: None,
            name: "root".to_string(),
            created_at: Utc::now(),
            locked: false,
            lock_secret: None,
            kind: NodeKind::SystemRoot,
        };
        self.put_node(&new_root)?;

        let drive_node = Node {
            id: legacy_root_id.to_string(),
            parent_id: Some(new_root_id.clone()),
            name,
            created_at,
            locked: false,
            lock_secret: None,
            kind: NodeKind::Drive { quota: self.default_drive_quota, usage: 0, hidden: false, access_code: None },
        };
        self.put_node(&drive_node)?;

        self.db.insert(key_root(), new_root_id.as_bytes())?;
        self.put_children(&new_root_id, &[legacy_root_id.to_string()])?;

        // The legacy root's own usage becomes the sum of file sizes
        // transitively beneath it -- spec.md's "record its usage as the
        // current stats.total_used", computed by scan since a pre-v1 store
        // mixing a flat root with a trustworthy cached total is not assumed.
        let usage = self.subtree_file_size(legacy_root_id)?;
        let mut drive_node = drive_node;
        if let NodeKind::Drive { usage: u, .. } = &mut drive_node.kind {
            *u = usage;
        }
        self.put_node(&drive_node)?;

        self.rebuild_stats()
    }

    // ----- low-level KV helpers -----

    fn get_json<T: for<'de> Deserialize<'de>>(&self, key: &[u8]) -> RivaultResult<Option<T>> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &[u8], value: &T) -> RivaultResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key, bytes)?;
        Ok(())
    }

    fn resolve_alias(&self, id: &str) -> RivaultResult<String> {
        if id == ROOT_ALIAS {
            let bytes = self
                .db
                .get(key_root())?
                .ok_or_else(|| RivaultError::Internal("system root not initialized".to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        } else {
            Ok(id.to_string())
        }
    }

    fn get_node(&self, id: &str) -> RivaultResult<Node> {
        self.get_json(&key_node(id))?
            .ok_or_else(|| RivaultError::NotFound(id.to_string()))
    }

    fn get_node_opt(&self, id: &str) -> RivaultResult<Option<Node>> {
        self.get_json(&key_node(id))
    }

    fn put_node(&self, node: &Node) -> RivaultResult<()> {
        self.put_json(&key_node(&node.id), node)
    }

    fn delete_node_record(&self, id: &str) -> RivaultResult<()> {
        self.db.remove(key_node(id))?;
        Ok(())
    }

    fn get_children(&self, id: &str) -> RivaultResult<Vec<String>> {
        Ok(self.get_json(&key_children(id))?.unwrap_or_default())
    }

    fn put_children(&self, id: &str, children: &[String]) -> RivaultResult<()> {
        self.put_json(&key_children(id), &children.to_vec())
    }

    fn delete_children_record(&self, id: &str) -> RivaultResult<()> {
        self.db.remove(key_children(id))?;
        Ok(())
    }

    fn get_stats(&self) -> RivaultResult<Stats> {
        Ok(self.get_json(key_stats())?.unwrap_or_default())
    }

    fn put_stats(&self, stats: Stats) -> RivaultResult<()> {
        self.put_json(key_stats(), &stats)
    }

    // ----- structural helpers -----

    /// Ids from `id` up to (and including) the system root.
    fn ancestor_chain(&self, id: &str) -> RivaultResult<Vec<String>> {
        let mut chain = vec![id.to_string()];
        let mut current = self.get_node(id)?;
        while let Some(parent_id) = current.parent_id.clone() {
            chain.push(parent_id.clone());
            current = self.get_node(&parent_id)?;
        }
        Ok(chain)
    }

    /// Walk up from `id` (inclusive) until a Drive is found.
    fn owning_drive(&self, id: &str) -> RivaultResult<Option<String>> {
        let mut current = self.get_node(id)?;
        loop {
            if matches!(current.kind, NodeKind::Drive { .. }) {
                return Ok(Some(current.id));
            }
            match current.parent_id.clone() {
                Some(parent_id) => current = self.get_node(&parent_id)?,
                None => return Ok(None),
            }
        }
    }

    fn sibling_conflict(&self, parent_id: &str, name: &str, exclude_id: Option<&str>) -> RivaultResult<Option<String>> {
        for child_id in self.get_children(parent_id)? {
            if Some(child_id.as_str()) == exclude_id {
                continue;
            }
            let child = self.get_node(&child_id)?;
            if child.name == name {
                return Ok(Some(child_id));
            }
        }
        Ok(None)
    }

    /// Sum of `size` over all Files transitively under `id` (inclusive of `id` itself if it's a File).
    fn subtree_file_size(&self, id: &str) -> RivaultResult<u64> {
        let node = self.get_node(id)?;
        match &node.kind {
            NodeKind::File { size, .. } => Ok(*size),
            _ => {
                let mut total = 0u64;
                for child_id in self.get_children(id)? {
                    total += self.subtree_file_size(&child_id)?;
                }
                Ok(total)
            }
        }
    }

    /// True if `id` or any node transitively under it is locked.
    fn subtree_has_lock(&self, id: &str) -> RivaultResult<bool> {
        let node = self.get_node(id)?;
        if node.locked {
            return Ok(true);
        }
        for child_id in self.get_children(id)? {
            if self.subtree_has_lock(&child_id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn adjust_drive_usage(&self, drive_id: &str, delta: i64) -> RivaultResult<()> {
        let mut drive = self.get_node(drive_id)?;
        if let NodeKind::Drive { usage, .. } = &mut drive.kind {
            let new_usage = (*usage as i64) + delta;
            *usage = new_usage.max(0) as u64;
        }
        self.put_node(&drive)
    }

    fn check_quota(&self, drive_id: &str, delta: i64) -> RivaultResult<()> {
        let drive = self.get_node(drive_id)?;
        if let NodeKind::Drive { usage, quota, .. } = &drive.kind {
            let projected = (*usage as i64) + delta;
            if projected > *quota as i64 {
                return Err(RivaultError::QuotaExceeded {
                    drive_id: drive_id.to_string(),
                    usage: *usage,
                    quota: *quota,
                    requested: delta.max(0) as u64,
                });
            }
        }
        Ok(())
    }

    fn rebuild_stats(&self) -> RivaultResult<()> {
        let root_id = self.resolve_alias(ROOT_ALIAS)?;
        let mut stats = Stats::default();
        self.rebuild_stats_visit(&root_id, &mut stats)?;
        self.put_stats(stats)
    }

    fn rebuild_stats_visit(&self, id: &str, stats: &mut Stats) -> RivaultResult<()> {
        let node = self.get_node(id)?;
        match &node.kind {
            NodeKind::File { size, .. } => {
                stats.file_count += 1;
                stats.total_used += size;
            }
            _ => {
                stats.folder_count += 1;
                for child_id in self.get_children(id)? {
                    self.rebuild_stats_visit(&child_id, stats)?;
                }
            }
        }
        Ok(())
    }

    // ----- public operations -----

    pub fn list(&self, folder_id: &str) -> RivaultResult<Vec<Node>> {
        let id = self.resolve_alias(folder_id)?;
        self.get_node(&id)?; // NotFound if missing
        let mut nodes = Vec::new();
        for child_id in self.get_children(&id)? {
            nodes.push(self.get_node(&child_id)?.redacted());
        }
        Ok(nodes)
    }

    pub fn get(&self, node_id: &str) -> RivaultResult<Node> {
        let id = self.resolve_alias(node_id)?;
        Ok(self.get_node(&id)?.redacted())
    }

    pub fn create_folder(&self, parent_id: &str, name: &str) -> RivaultResult<Node> {
        let parent_id = self.resolve_alias(parent_id)?;
        let parent = self.get_node(&parent_id)?;
        if !parent.kind.can_have_children() {
            return Err(RivaultError::InvalidTarget(format!("{} cannot have children", parent_id)));
        }
        if self.sibling_conflict(&parent_id, name, None)?.is_some() {
            return Err(RivaultError::NameConflict(name.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let node = Node {
            id: id.clone(),
            parent_id: Some(parent_id.clone()),
            name: name.to_string(),
            created_at: Utc::now(),
            locked: false,
            lock_secret: None,
            kind: NodeKind::Folder,
        };
        self.put_node(&node)?;
        self.put_children(&id, &[])?;

        let mut siblings = self.get_children(&parent_id)?;
        siblings.push(id.clone());
        self.put_children(&parent_id, &siblings)?;

        let mut stats = self.get_stats()?;
        stats.folder_count += 1;
        self.put_stats(stats)?;

        Ok(node)
    }

    /// Creates a file, or -- with `req.overwrite` -- replaces an existing
    /// sibling File's content in place. Returns the new node plus the
    /// storage refs of any chunks the overwrite discarded, for the caller to
    /// best-effort delete from the blob store (mirroring `delete`'s
    /// `freed_refs`); a fresh creation always returns an empty list.
    pub fn create_file(&self, parent_id: &str, req: &CreateFileRequest) -> RivaultResult<(Node, Vec<String>)> {
        let parent_id = self.resolve_alias(parent_id)?;
        let parent = self.get_node(&parent_id)?;
        if !parent.kind.can_have_children() {
            return Err(RivaultError::InvalidTarget(format!("{} cannot have children", parent_id)));
        }

        let existing_conflict = self.sibling_conflict(&parent_id, &req.name, None)?;
        let (file_id, old_size, is_overwrite, freed_refs) = match &existing_conflict {
            Some(existing_id) => {
                let existing = self.get_node(existing_id)?;
                if !existing.kind.is_file() || !req.overwrite {
                    return Err(RivaultError::NameConflict(req.name.clone()));
                }
                if existing.locked {
                    return Err(RivaultError::Forbidden(format!("{} is locked", existing_id)));
                }
                let (old_size, old_chunks) = match existing.kind {
                    NodeKind::File { size, chunks, .. } => (size, chunks),
                    _ => (0, Vec::new()),
                };
                let freed_refs = old_chunks.into_iter().map(|c| c.storage_ref).collect();
                (existing_id.clone(), old_size, true, freed_refs)
            }
            None => (Uuid::new_v4().to_string(), 0, false, Vec::new()),
        };

        let delta = req.size as i64 - old_size as i64;
        if let Some(drive_id) = self.owning_drive(&parent_id)? {
            self.check_quota(&drive_id, delta)?;
        }

        let now = Utc::now();
        let node = Node {
            id: file_id.clone(),
            parent_id: Some(parent_id.clone()),
            name: req.name.clone(),
            created_at: if is_overwrite {
                self.get_node(&file_id)?.created_at
            } else {
                now
            },
            locked: false,
            lock_secret: None,
            kind: NodeKind::File {
                size: req.size,
                chunk_size: req.chunk_size,
                mime_type: req.mime_type.clone(),
                updated_at: now,
                chunks: Vec::new(),
                encryption: req.encryption.clone(),
            },
        };
        self.put_node(&node)?;

        if !is_overwrite {
            let mut siblings = self.get_children(&parent_id)?;
            siblings.push(file_id.clone());
            self.put_children(&parent_id, &siblings)?;

            let mut stats = self.get_stats()?;
            stats.file_count += 1;
            stats.total_used = (stats.total_used as i64 + delta).max(0) as u64;
            self.put_stats(stats)?;
        } else {
            let mut stats = self.get_stats()?;
            stats.total_used = (stats.total_used as i64 + delta).max(0) as u64;
            self.put_stats(stats)?;
        }

        if let Some(drive_id) = self.owning_drive(&parent_id)? {
            self.adjust_drive_usage(&drive_id, delta)?;
        }

        Ok((node, freed_refs))
    }

    /// Appends a chunk, deduplicating by `order`: a duplicate order keeps the
    /// newer reference. Returns the superseded storage ref, if any, so the
    /// caller can best-effort delete it from the blob store.
    pub fn append_chunk(&self, file_id: &str, order: u32, storage_ref: &str) -> RivaultResult<Option<String>> {
        let mut node = self.get_node(file_id)?;
        let (chunks, updated_at) = match &mut node.kind {
            NodeKind::File { chunks, updated_at, .. } => (chunks, updated_at),
            _ => return Err(RivaultError::InvalidTarget(format!("{} is not a file", file_id))),
        };

        let mut superseded = None;
        if let Some(existing) = chunks.iter_mut().find(|c| c.order == order) {
            superseded = Some(existing.storage_ref.clone());
            existing.storage_ref = storage_ref.to_string();
        } else {
            chunks.push(ChunkRef { order, storage_ref: storage_ref.to_string() });
        }
        *updated_at = Utc::now();

        self.put_node(&node)?;
        Ok(superseded)
    }

    pub fn rename(&self, node_id: &str, new_name: &str) -> RivaultResult<Node> {
        let mut node = self.get_node(node_id)?;
        if matches!(node.kind, NodeKind::SystemRoot) {
            return Err(RivaultError::Forbidden("cannot rename the system root".to_string()));
        }
        if node.locked {
            return Err(RivaultError::Forbidden(format!("{} is locked", node_id)));
        }
        let parent_id = node.parent_id.clone().ok_or_else(|| RivaultError::Internal("non-root node with no parent".to_string()))?;
        if self.sibling_conflict(&parent_id, new_name, Some(node_id))?.is_some() {
            return Err(RivaultError::NameConflict(new_name.to_string()));
        }

        node.name = new_name.to_string();
        if let NodeKind::File { updated_at, .. } = &mut node.kind {
            *updated_at = Utc::now();
        }
        self.put_node(&node)?;
        Ok(node)
    }

    pub fn move_node(&self, node_id: &str, new_parent_id: &str) -> RivaultResult<Node> {
        let new_parent_id = self.resolve_alias(new_parent_id)?;
        let mut node = self.get_node(node_id)?;
        if matches!(node.kind, NodeKind::SystemRoot) {
            return Err(RivaultError::Forbidden("cannot move the system root".to_string()));
        }
        if node.locked {
            return Err(RivaultError::Forbidden(format!("{} is locked", node_id)));
        }

        let new_parent = self.get_node(&new_parent_id)?;
        if new_parent.kind.is_file() {
            return Err(RivaultError::InvalidTarget("destination is a file".to_string()));
        }

        let destination_chain = self.ancestor_chain(&new_parent_id)?;
        if destination_chain.iter().any(|id| id == node_id) {
            return Err(RivaultError::Cycle(format!("{} is an ancestor of destination", node_id)));
        }

        let old_parent_id = node
            .parent_id
            .clone()
            .ok_or_else(|| RivaultError::Internal("non-root node with no parent".to_string()))?;

        if old_parent_id == new_parent_id {
            // No-op modulo timestamps when no name conflict exists.
            return Ok(node);
        }

        if self.sibling_conflict(&new_parent_id, &node.name, None)?.is_some() {
            return Err(RivaultError::NameConflict(node.name.clone()));
        }

        let source_drive = self.owning_drive(&old_parent_id)?;
        let dest_drive = self.owning_drive(&new_parent_id)?;
        let moved_size = self.subtree_file_size(node_id)? as i64;

        if source_drive != dest_drive {
            if let Some(dest) = &dest_drive {
                self.check_quota(dest, moved_size)?;
            }
        }

        let mut old_siblings = self.get_children(&old_parent_id)?;
        old_siblings.retain(|id| id != node_id);
        self.put_children(&old_parent_id, &old_siblings)?;

        let mut new_siblings = self.get_children(&new_parent_id)?;
        new_siblings.push(node_id.to_string());
        self.put_children(&new_parent_id, &new_siblings)?;

        node.parent_id = Some(new_parent_id.clone());
        self.put_node(&node)?;

        if source_drive != dest_drive {
            if let Some(source) = &source_drive {
                self.adjust_drive_usage(source, -moved_size)?;
            }
            if let Some(dest) = &dest_drive {
                self.adjust_drive_usage(dest, moved_size)?;
            }
        }

        Ok(node)
    }

    /// Recursively deletes `node_id` and everything under it. Idempotent:
    /// deleting a missing id is a no-op success. Refuses to touch anything
    /// if the subtree contains any locked node -- never a partial delete.
    /// Returns the storage refs of every chunk removed, for best-effort
    /// deletion from the blob store by the caller.
    pub fn delete(&self, node_id: &str) -> RivaultResult<Vec<String>> {
        let node_id = match self.resolve_alias(node_id) {
            Ok(id) => id,
            Err(_) => return Ok(Vec::new()),
        };
        let node = match self.get_node_opt(&node_id)? {
            Some(n) => n,
            None => return Ok(Vec::new()),
        };
        if matches!(node.kind, NodeKind::SystemRoot) {
            return Err(RivaultError::Forbidden("cannot delete the system root".to_string()));
        }
        if self.subtree_has_lock(&node_id)? {
            return Err(RivaultError::Forbidden(format!("{} contains a locked node", node_id)));
        }

        let mut stats = self.get_stats()?;
        let mut freed_refs = Vec::new();
        self.delete_subtree(&node_id, &mut stats, &mut freed_refs)?;
        self.put_stats(stats)?;

        if let Some(parent_id) = node.parent_id {
            let mut siblings = self.get_children(&parent_id)?;
            siblings.retain(|id| id != &node_id);
            self.put_children(&parent_id, &siblings)?;
        }

        Ok(freed_refs)
    }

    fn delete_subtree(&self, id: &str, stats: &mut Stats, freed_refs: &mut Vec<String>) -> RivaultResult<()> {
        let node = self.get_node(id)?;
        for child_id in self.get_children(id)? {
            self.delete_subtree(&child_id, stats, freed_refs)?;
        }

        match &node.kind {
            NodeKind::File { size, chunks, .. } => {
                stats.file_count = stats.file_count.saturating_sub(1);
                stats.total_used = stats.total_used.saturating_sub(*size);
                if let Some(parent_id) = &node.parent_id {
                    if let Some(drive_id) = self.owning_drive(parent_id)? {
                        self.adjust_drive_usage(&drive_id, -(*size as i64))?;
                    }
                }
                for chunk in chunks {
                    freed_refs.push(chunk.storage_ref.clone());
                }
            }
            NodeKind::Drive { .. } | NodeKind::Folder => {
                stats.folder_count = stats.folder_count.saturating_sub(1);
            }
            NodeKind::SystemRoot => unreachable!("system root cannot appear inside a deletable subtree"),
        }

        self.delete_node_record(id)?;
        self.delete_children_record(id)?;
        Ok(())
    }

    pub fn lock(&self, node_id: &str, secret: &str) -> RivaultResult<()> {
        let mut node = self.get_node(node_id)?;
        node.locked = true;
        node.lock_secret = Some(secret.to_string());
        self.put_node(&node)
    }

    pub fn unlock(&self, node_id: &str, secret: &str, override_code: Option<&str>) -> RivaultResult<()> {
        if !self.verify_lock(node_id, secret, override_code)? {
            return Err(RivaultError::AuthFailed(format!("invalid lock secret for {}", node_id)));
        }
        let mut node = self.get_node(node_id)?;
        node.locked = false;
        node.lock_secret = None;
        self.put_node(&node)
    }

    pub fn verify_lock(&self, node_id: &str, secret: &str, override_code: Option<&str>) -> RivaultResult<bool> {
        let node = self.get_node(node_id)?;
        if let Some(code) = override_code {
            if secret == code {
                return Ok(true);
            }
        }
        Ok(node.lock_secret.as_deref() == Some(secret))
    }

    pub fn stats(&self) -> RivaultResult<Stats> {
        self.get_stats()
    }

    /// Creates a new top-level Drive named after `letter` (A-Z, unique among
    /// existing drives) directly under the system root.
    pub fn create_drive(&self, letter: char, quota: u64) -> RivaultResult<Node> {
        let root_id = self.resolve_alias(ROOT_ALIAS)?;
        let name = format!("Local Disk ({}:)", letter.to_ascii_uppercase());
        if self.sibling_conflict(&root_id, &name, None)?.is_some() {
            return Err(RivaultError::NameConflict(name));
        }

        let id = Uuid::new_v4().to_string();
        let node = Node {
            id: id.clone(),
            parent_id: Some(root_id.clone()),
            name,
            created_at: Utc::now(),
            locked: false,
            lock_secret: None,
            kind: NodeKind::Drive { quota, usage: 0, hidden: false, access_code: None },
        };
        self.put_node(&node)?;
        self.put_children(&id, &[])?;

        let mut siblings = self.get_children(&root_id)?;
        siblings.push(id.clone());
        self.put_children(&root_id, &siblings)?;

        let mut stats = self.get_stats()?;
        stats.folder_count += 1;
        self.put_stats(stats)?;

        Ok(node)
    }

    /// Deletes a Drive. Fails `InvalidTarget` if `drive_id` is not a Drive,
    /// `Forbidden` if it still has children.
    pub fn delete_drive(&self, drive_id: &str) -> RivaultResult<()> {
        let node = self.get_node(drive_id)?;
        if !matches!(node.kind, NodeKind::Drive { .. }) {
            return Err(RivaultError::InvalidTarget(format!("{} is not a drive", drive_id)));
        }
        if !self.get_children(drive_id)?.is_empty() {
            return Err(RivaultError::Forbidden(format!("drive {} is not empty", drive_id)));
        }

        if let Some(parent_id) = &node.parent_id {
            let mut siblings = self.get_children(parent_id)?;
            siblings.retain(|id| id != drive_id);
            self.put_children(parent_id, &siblings)?;
        }

        let mut stats = self.get_stats()?;
        stats.folder_count = stats.folder_count.saturating_sub(1);
        self.put_stats(stats)?;

        self.delete_node_record(drive_id)?;
        self.delete_children_record(drive_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_engine() -> (TempDir, MetadataEngine) {
        let dir = TempDir::new().unwrap();
        let engine = MetadataEngine::open(&dir.path().join("meta.sled"), 10 * 1024 * 1024 * 1024).unwrap();
        (dir, engine)
    }

    #[test]
    fn fresh_init_creates_root_and_default_drive() {
        let (_dir, engine) = open_engine();
        let listing = engine.list("root").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "Local Disk (C:)");

        let stats = engine.stats().unwrap();
        assert_eq!(stats, Stats { total_used: 0, file_count: 0, folder_count: 2 });
    }

    #[test]
    fn sibling_names_must_be_unique() {
        let (_dir, engine) = open_engine();
        engine.create_folder("root", "docs").unwrap();
        let err = engine.create_folder("root", "docs").unwrap_err();
        assert!(matches!(err, RivaultError::NameConflict(_)));
    }

    #[test]
    fn cycle_rejection_on_move() {
        let (_dir, engine) = open_engine();
        let a = engine.create_folder("root", "A").unwrap();
        let b = engine.create_folder(&a.id, "B").unwrap();
        let err = engine.move_node(&a.id, &b.id).unwrap_err();
        assert!(matches!(err, RivaultError::Cycle(_)));
    }

    #[test]
    fn quota_enforcement_rejects_overage() {
        let dir = TempDir::new().unwrap();
        let engine = MetadataEngine::open(&dir.path().join("meta.sled"), 1024).unwrap();
        let root_children = engine.list("root").unwrap();
        let drive_id = &root_children[0].id;

        engine
            .create_file(drive_id, &CreateFileRequest {
                name: "a.bin".to_string(),
                size: 1024,
                mime_type: "application/octet-stream".to_string(),
                encryption: None,
                overwrite: false,
                chunk_size: 5 * 1024 * 1024,
            })
            .unwrap();

        let err = engine
            .create_file(drive_id, &CreateFileRequest {
                name: "b.bin".to_string(),
                size: 1,
                mime_type: "application/octet-stream".to_string(),
                encryption: None,
                overwrite: false,
                chunk_size: 5 * 1024 * 1024,
            })
            .unwrap_err();
        assert!(matches!(err, RivaultError::QuotaExceeded { .. }));

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_used, 1024);
    }

    #[test]
    fn pre_v1_flat_root_migrates_to_system_root_and_default_drive() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("meta.sled");

        // Seed a pre-v1 store by hand: a typeless root record (the legacy
        // "folder acting as a flat root") and no `system_version` key.
        {
            let db = sled::open(&db_path).unwrap();
            let legacy_root_id = "legacy-root-id".to_string();
            let legacy_root = serde_json::json!({
                "id": legacy_root_id,
                "parent_id": null,
                "name": "My Files",
                "created_at": "2020-01-01T00:00:00Z",
                "locked": false,
            });
            db.insert(b"root".as_ref(), legacy_root_id.as_bytes()).unwrap();
            db.insert(
                format!("node:{}", legacy_root_id).as_bytes(),
                serde_json::to_vec(&legacy_root).unwrap(),
            )
            .unwrap();
            db.insert(
                format!("children:{}", legacy_root_id).as_bytes(),
                serde_json::to_vec::<Vec<String>>(&vec![]).unwrap(),
            )
            .unwrap();
            db.flush().unwrap();
        }

        let engine = MetadataEngine::open(&db_path, 10 * 1024 * 1024 * 1024).unwrap();

        let listing = engine.list("root").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].id, "legacy-root-id");
        assert_eq!(listing[0].name, "My Files");
        match &listing[0].kind {
            NodeKind::Drive { quota, usage, .. } => {
                assert_eq!(*quota, 10 * 1024 * 1024 * 1024);
                assert_eq!(*usage, 0);
            }
            other => panic!("expected legacy root to become a Drive, got {:?}", other),
        }

        let stats = engine.stats().unwrap();
        assert_eq!(stats, Stats { total_used: 0, file_count: 0, folder_count: 2 });

        // Reopening must not attempt to re-migrate (the node is now tagged).
        drop(engine);
        let reopened = MetadataEngine::open(&db_path, 10 * 1024 * 1024 * 1024).unwrap();
        let listing = reopened.list("root").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].id, "legacy-root-id");
    }

    #[test]
    fn overwrite_resets_chunks_and_adjusts_stats() {
        let (_dir, engine) = open_engine();
        let root_children = engine.list("root").unwrap();
        let drive_id = &root_children[0].id;

        let (file, _) = engine
            .create_file(drive_id, &CreateFileRequest {
                name: "x.bin".to_string(),
                size: 15 * 1024 * 1024,
                mime_type: "application/octet-stream".to_string(),
                encryption: None,
                overwrite: false,
                chunk_size: 5 * 1024 * 1024,
            })
            .unwrap();
        engine.append_chunk(&file.id, 0, "ref0").unwrap();
        engine.append_chunk(&file.id, 1, "ref1").unwrap();
        engine.append_chunk(&file.id, 2, "ref2").unwrap();

        let (overwritten, freed_refs) = engine
            .create_file(drive_id, &CreateFileRequest {
                name: "x.bin".to_string(),
                size: 3,
                mime_type: "text/plain".to_string(),
                encryption: None,
                overwrite: true,
                chunk_size: 5 * 1024 * 1024,
            })
            .unwrap();

        assert_eq!(overwritten.id, file.id);
        assert_eq!(freed_refs, vec!["ref0".to_string(), "ref1".to_string(), "ref2".to_string()]);
        match overwritten.kind {
            NodeKind::File { chunks, size, .. } => {
                assert!(chunks.is_empty());
                assert_eq!(size, 3);
            }
            _ => panic!("expected file"),
        }

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_used, 3);
    }

    #[test]
    fn overwrite_rejects_locked_target() {
        let (_dir, engine) = open_engine();
        let root_children = engine.list("root").unwrap();
        let drive_id = &root_children[0].id;

        let (file, _) = engine
            .create_file(drive_id, &CreateFileRequest {
                name: "locked.bin".to_string(),
                size: 10,
                mime_type: "application/octet-stream".to_string(),
                encryption: None,
                overwrite: false,
                chunk_size: 5 * 1024 * 1024,
            })
            .unwrap();
        engine.lock(&file.id, "secret").unwrap();

        let err = engine
            .create_file(drive_id, &CreateFileRequest {
                name: "locked.bin".to_string(),
                size: 1,
                mime_type: "application/octet-stream".to_string(),
                encryption: None,
                overwrite: true,
                chunk_size: 5 * 1024 * 1024,
            })
            .unwrap_err();
        assert!(matches!(err, RivaultError::Forbidden(_)));
    }

    #[test]
    fn recursive_delete_refuses_locked_descendant() {
        let (_dir, engine) = open_engine();
        let root_children = engine.list("root").unwrap();
        let drive_id = &root_children[0].id;
        let folder = engine.create_folder(drive_id, "F").unwrap();
        let (file, _) = engine
            .create_file(&folder.id, &CreateFileRequest {
                name: "L".to_string(),
                size: 10,
                mime_type: "text/plain".to_string(),
                encryption: None,
                overwrite: false,
                chunk_size: 5 * 1024 * 1024,
            })
            .unwrap();
        engine.lock(&file.id, "secret").unwrap();

        let err = engine.delete(&folder.id).unwrap_err();
        assert!(matches!(err, RivaultError::Forbidden(_)));
        assert!(engine.get(&folder.id).is_ok());
        assert!(engine.get(&file.id).is_ok());
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, engine) = open_engine();
        let folder = engine.create_folder("root", "gone").unwrap();
        engine.delete(&folder.id).unwrap();
        engine.delete(&folder.id).unwrap();
        assert!(engine.get(&folder.id).is_err());
    }

    #[test]
    fn list_never_exposes_lock_secret() {
        let (_dir, engine) = open_engine();
        let folder = engine.create_folder("root", "secretive").unwrap();
        engine.lock(&folder.id, "shh").unwrap();
        let listing = engine.list("root").unwrap();
        let locked = listing.iter().find(|n| n.id == folder.id).unwrap();
        assert_eq!(locked.lock_secret, None);
        assert!(locked.locked);
    }

    #[test]
    fn verify_lock_rejects_wrong_secret_and_accepts_override() {
        let (_dir, engine) = open_engine();
        let folder = engine.create_folder("root", "vault").unwrap();
        engine.lock(&folder.id, "shh").unwrap();

        assert!(!engine.verify_lock(&folder.id, "wrong", Some("2903")).unwrap());
        assert!(engine.verify_lock(&folder.id, "shh", None).unwrap());
        assert!(engine.verify_lock(&folder.id, "not-the-secret", Some("2903")).unwrap() == false);
        assert!(engine.verify_lock(&folder.id, "2903", Some("2903")).unwrap());
    }

    #[test]
    fn create_drive_rejects_duplicate_letter_and_delete_refuses_non_empty() {
        let (_dir, engine) = open_engine();
        let drive = engine.create_drive('D', 1024).unwrap();
        let err = engine.create_drive('d', 2048).unwrap_err();
        assert!(matches!(err, RivaultError::NameConflict(_)));

        engine.create_folder(&drive.id, "inside").unwrap();
        let err = engine.delete_drive(&drive.id).unwrap_err();
        assert!(matches!(err, RivaultError::Forbidden(_)));
    }

    #[test]
    fn move_to_original_parent_is_a_no_op() {
        let (_dir, engine) = open_engine();
        let root_children = engine.list("root").unwrap();
        let drive_id = &root_children[0].id;
        let folder = engine.create_folder(drive_id, "stays").unwrap();
        let moved = engine.move_node(&folder.id, drive_id).unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(drive_id.as_str()));
    }
}
