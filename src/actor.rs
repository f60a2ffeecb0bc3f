// ===================================================================================================
// Per-User Actor (C5) - Serialized Metadata Access
// ===================================================================================================
//
// Each user's metadata database is owned by exactly one actor task; callers
// never touch a `MetadataEngine` directly. A `Command` is sent down an mpsc
// channel and answered on a one-shot reply channel, so every mutation for a
// given user runs to completion before the next one starts -- that ordering
// is what makes the metadata engine's multi-key read-modify-write sequences
// atomic without any locking inside the engine itself.
// ===================================================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::error::{RivaultError, RivaultResult};
use crate::metadata::{CreateFileRequest, MetadataEngine, Node, Stats};

type Reply<T> = oneshot::Sender<RivaultResult<T>>;

enum Command {
    List { folder_id: String, reply: Reply<Vec<Node>> },
    Get { node_id: String, reply: Reply<Node> },
    CreateFolder { parent_id: String, name: String, reply: Reply<Node> },
    CreateFile { parent_id: String, req: CreateFileRequest, reply: Reply<(Node, Vec<String>)> },
    AppendChunk { file_id: String, order: u32, storage_ref: String, reply: Reply<Option<String>> },
    Rename { node_id: String, new_name: String, reply: Reply<Node> },
    Move { node_id: String, new_parent_id: String, reply: Reply<Node> },
    Delete { node_id: String, reply: Reply<Vec<String>> },
    Lock { node_id: String, secret: String, reply: Reply<()> },
    Unlock { node_id: String, secret: String, override_code: Option<String>, reply: Reply<()> },
    VerifyLock { node_id: String, secret: String, override_code: Option<String>, reply: Reply<bool> },
    Stats { reply: Reply<Stats> },
    CreateDrive { letter: char, quota: u64, reply: Reply<Node> },
    DeleteDrive { drive_id: String, reply: Reply<()> },
}

struct UserActor {
    engine: MetadataEngine,
    inbox: mpsc::Receiver<Command>,
}

impl UserActor {
    fn run(mut self) {
        while let Some(cmd) = self.inbox.blocking_recv() {
            self.handle(cmd);
        }
    }

    fn handle(&self, cmd: Command) {
        match cmd {
            Command::List { folder_id, reply } => {
                let _ = reply.send(self.engine.list(&folder_id));
            }
            Command::Get { node_id, reply } => {
                let _ = reply.send(self.engine.get(&node_id));
            }
            Command::CreateFolder { parent_id, name, reply } => {
                let _ = reply.send(self.engine.create_folder(&parent_id, &name));
            }
            Command::CreateFile { parent_id, req, reply } => {
                let _ = reply.send(self.engine.create_file(&parent_id, &req));
            }
            Command::AppendChunk { file_id, order, storage_ref, reply } => {
                let _ = reply.send(self.engine.append_chunk(&file_id, order, &storage_ref));
            }
            Command::Rename { node_id, new_name, reply } => {
                let _ = reply.send(self.engine.rename(&node_id, &new_name));
            }
            Command::Move { node_id, new_parent_id, reply } => {
                let _ = reply.send(self.engine.move_node(&node_id, &new_parent_id));
            }
            Command::Delete { node_id, reply } => {
                let _ = reply.send(self.engine.delete(&node_id));
            }
            Command::Lock { node_id, secret, reply } => {
                let _ = reply.send(self.engine.lock(&node_id, &secret));
            }
            Command::Unlock { node_id, secret, override_code, reply } => {
                let _ = reply.send(self.engine.unlock(&node_id, &secret, override_code.as_deref()));
            }
            Command::VerifyLock { node_id, secret, override_code, reply } => {
                let _ = reply.send(self.engine.verify_lock(&node_id, &secret, override_code.as_deref()));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.engine.stats());
            }
            Command::CreateDrive { letter, quota, reply } => {
                let _ = reply.send(self.engine.create_drive(letter, quota));
            }
            Command::DeleteDrive { drive_id, reply } => {
                let _ = reply.send(self.engine.delete_drive(&drive_id));
            }
        }
    }
}

/// A cheaply-cloneable reference to a user's running actor.
#[derive(Clone)]
pub struct ActorHandle {
    sender: mpsc::Sender<Command>,
}

impl ActorHandle {
    fn spawn(engine: MetadataEngine) -> Self {
        let (sender, inbox) = mpsc::channel(64);
        let actor = UserActor { engine, inbox };
        // The engine is synchronous (sled is a blocking API), so the actor
        // runs on a dedicated blocking thread rather than the async runtime.
        tokio::task::spawn_blocking(move || actor.run());
        ActorHandle { sender }
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> RivaultResult<T> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| RivaultError::Internal("user actor is no longer running".to_string()))?;
        rx.await.map_err(|_| RivaultError::Internal("user actor dropped the reply channel".to_string()))?
    }

    pub async fn list(&self, folder_id: &str) -> RivaultResult<Vec<Node>> {
        self.call(|reply| Command::List { folder_id: folder_id.to_string(), reply }).await
    }

    pub async fn get(&self, node_id: &str) -> RivaultResult<Node> {
        self.call(|reply| Command::Get { node_id: node_id.to_string(), reply }).await
    }

    pub async fn create_folder(&self, parent_id: &str, name: &str) -> RivaultResult<Node> {
        self.call(|reply| Command::CreateFolder { parent_id: parent_id.to_string(), name: name.to_string(), reply })
            .await
    }

    pub async fn create_file(&self, parent_id: &str, req: CreateFileRequest) -> RivaultResult<(Node, Vec<String>)> {
        self.call(|reply| Command::CreateFile { parent_id: parent_id.to_string(), req, reply }).await
    }

    pub async fn append_chunk(&self, file_id: &str, order: u32, storage_ref: &str) -> RivaultResult<Option<String>> {
        self.call(|reply| Command::AppendChunk {
            file_id: file_id.to_string(),
            order,
            storage_ref: storage_ref.to_string(),
            reply,
        })
        .await
    }

    pub async fn rename(&self, node_id: &str, new_name: &str) -> RivaultResult<Node> {
        self.call(|reply| Command::Rename { node_id: node_id.to_string(), new_name: new_name.to_string(), reply })
            .await
    }

    pub async fn move_node(&self, node_id: &str, new_parent_id: &str) -> RivaultResult<Node> {
        self.call(|reply| Command::Move {
            node_id: node_id.to_string(),
            new_parent_id: new_parent_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn delete(&self, node_id: &str) -> RivaultResult<Vec<String>> {
        self.call(|reply| Command::Delete { node_id: node_id.to_string(), reply }).await
    }

    pub async fn lock(&self, node_id: &str, secret: &str) -> RivaultResult<()> {
        self.call(|reply| Command::Lock { node_id: node_id.to_string(), secret: secret.to_string(), reply }).await
    }

    pub async fn unlock(&self, node_id: &str, secret: &str, override_code: Option<String>) -> RivaultResult<()> {
        self.call(|reply| Command::Unlock {
            node_id: node_id.to_string(),
            secret: secret.to_string(),
            override_code,
            reply,
        })
        .await
    }

    pub async fn verify_lock(&self, node_id: &str, secret: &str, override_code: Option<String>) -> RivaultResult<bool> {
        self.call(|reply| Command::VerifyLock {
            node_id: node_id.to_string(),
            secret: secret.to_string(),
            override_code,
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> RivaultResult<Stats> {
        self.call(|reply| Command::Stats { reply }).await
    }

    pub async fn create_drive(&self, letter: char, quota: u64) -> RivaultResult<Node> {
        self.call(|reply| Command::CreateDrive { letter, quota, reply }).await
    }

    pub async fn delete_drive(&self, drive_id: &str) -> RivaultResult<()> {
        self.call(|reply| Command::DeleteDrive { drive_id: drive_id.to_string(), reply }).await
    }
}

/// Lazily spawns and caches one actor per user id, keyed by a per-user
/// directory under `data_dir/users/{user_id}/metadata.sled`.
pub struct ActorRegistry {
    handles: RwLock<HashMap<String, ActorHandle>>,
    data_dir: PathBuf,
    default_drive_quota: u64,
}

impl ActorRegistry {
    pub fn new(data_dir: PathBuf, default_drive_quota: u64) -> Self {
        Self { handles: RwLock::new(HashMap::new()), data_dir, default_drive_quota }
    }

    pub async fn handle_for(&self, user_id: &str) -> RivaultResult<ActorHandle> {
        if let Some(handle) = self.handles.read().await.get(user_id) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write().await;
        if let Some(handle) = handles.get(user_id) {
            return Ok(handle.clone());
        }

        let user_dir = self.data_dir.join("users").join(user_id);
        std::fs::create_dir_all(&user_dir)?;
        let engine = MetadataEngine::open(&user_dir.join("metadata.sled"), self.default_drive_quota)?;
        let handle = ActorHandle::spawn(engine);
        handles.insert(user_id.to_string(), handle.clone());
        Ok(handle)
    }
}

pub type SharedActorRegistry = Arc<ActorRegistry>;
