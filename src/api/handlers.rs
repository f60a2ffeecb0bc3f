use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use bytes::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::RivaultError;
use crate::metadata::{CreateFileRequest, EncryptionHeader, Node};

use super::{user_id_from_headers, ApiResult, ApiState};

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct AuthVerifyBody {
    #[allow(dead_code)]
    pub password: String,
}

/// The server never holds the password or any derived key -- all envelope
/// encryption is client-side. This endpoint is a stub, as the design allows.
pub async fn verify_auth(Json(_body): Json<AuthVerifyBody>) -> impl IntoResponse {
    Json(json!({ "success": true }))
}

pub async fn get_stats(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let stats = handle.stats().await?;
    Ok(Json(stats))
}

pub async fn list_folder(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(folder_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let nodes = handle.list(&folder_id).await?;
    Ok(Json(nodes))
}

#[derive(Deserialize)]
pub struct CreateFolderBody {
    pub parent_id: String,
    pub name: String,
}

pub async fn create_folder(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<CreateFolderBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let node = handle.create_folder(&body.parent_id, &body.name).await?;
    crate::logging::log_metadata_op("create_folder", &user_id, &node.id);
    Ok(Json(node))
}

#[derive(Deserialize)]
pub struct CreateFileBody {
    pub parent_id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub encryption: Option<EncryptionHeader>,
    #[serde(default)]
    pub overwrite: bool,
}

pub async fn create_file(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<CreateFileBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let request = CreateFileRequest {
        name: body.name,
        size: body.size,
        mime_type: body.mime_type,
        encryption: body.encryption,
        overwrite: body.overwrite,
        chunk_size: crate::metadata::engine::default_chunk_size(),
    };
    let (node, freed_refs) = handle.create_file(&body.parent_id, request).await?;
    crate::logging::log_metadata_op("create_file", &user_id, &node.id);
    for storage_ref in freed_refs {
        if let Err(e) = state.blob.delete(&storage_ref).await {
            crate::logging::log_orphan_chunk(&storage_ref, &format!("best-effort blob delete failed: {}", e));
        }
    }
    Ok(Json(node))
}

pub async fn get_file(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let node = handle.get(&file_id).await?;
    if !node.kind.is_file() {
        return Err(RivaultError::InvalidTarget(format!("{} is not a file", file_id)).into());
    }
    Ok(Json(node))
}

#[derive(Deserialize)]
pub struct ChunkQuery {
    pub order: u32,
}

pub async fn upload_chunk(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;

    let storage_ref = state.blob.put(&body).await?;

    match handle.append_chunk(&file_id, query.order, &storage_ref).await {
        Ok(superseded) => {
            crate::logging::log_chunk_op("append", &file_id, &format!("order={} ref={}", query.order, storage_ref));
            if let Some(old_ref) = superseded {
                if let Err(e) = state.blob.delete(&old_ref).await {
                    crate::logging::log_orphan_chunk(&old_ref, &format!("superseded chunk delete failed: {}", e));
                }
            }
            Ok(Json(json!({ "order": query.order, "storage_ref": storage_ref })))
        }
        Err(e) => {
            // The blob is already written; metadata append failed. This is the
            // explicit orphan trade-off instead of a two-phase commit.
            crate::logging::log_orphan_chunk(&storage_ref, "metadata append failed");
            Err(e.into())
        }
    }
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "lockKey")]
    pub lock_key: Option<String>,
}

pub async fn download_file(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;

    let node = handle.get(&file_id).await?;
    let (mime_type, mut chunks) = match &node.kind {
        crate::metadata::NodeKind::File { mime_type, chunks, .. } => (mime_type.clone(), chunks.clone()),
        _ => return Err(RivaultError::InvalidTarget(format!("{} is not a file", file_id)).into()),
    };

    if node.locked {
        let secret = query.lock_key.unwrap_or_default();
        let ok = handle
            .verify_lock(&file_id, &secret, state.config.security.override_code.clone())
            .await?;
        if !ok {
            return Err(RivaultError::Forbidden(format!("{} is locked", file_id)).into());
        }
    }

    chunks.sort_by_key(|c| c.order);
    let blob = state.blob.clone();
    let iter = chunks.into_iter();
    let stream = futures::stream::unfold((iter, blob, false), |(mut iter, blob, errored)| async move {
        if errored {
            return None;
        }
        match iter.next() {
            Some(chunk) => match blob.get(&chunk.storage_ref).await {
                Ok(bytes) => Some((Ok::<_, std::io::Error>(Bytes::from(bytes)), (iter, blob, false))),
                Err(e) => {
                    tracing::warn!(target: "rivault::chunk", storage_ref = %chunk.storage_ref, error = %e, "chunk fetch failed mid-stream");
                    Some((Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())), (iter, blob, true)))
                }
            },
            None => None,
        }
    });

    let filename = urlencoding::encode(&node.name).into_owned();
    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", mime_type)
        .header("Content-Disposition", format!("attachment; filename=\"{}\"", filename))
        .body(Body::from_stream(stream))
        .map_err(|e| RivaultError::Internal(e.to_string()))?;
    Ok(response)
}

#[derive(Deserialize)]
pub struct RenameBody {
    pub name: String,
}

pub async fn rename_node(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(node_id): Path<String>,
    Json(body): Json<RenameBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let node = handle.rename(&node_id, &body.name).await?;
    crate::logging::log_metadata_op("rename", &user_id, &node.id);
    Ok(Json(node))
}

#[derive(Deserialize)]
pub struct MoveBody {
    pub new_parent_id: String,
}

pub async fn move_node(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(node_id): Path<String>,
    Json(body): Json<MoveBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let node = handle.move_node(&node_id, &body.new_parent_id).await?;
    crate::logging::log_metadata_op("move", &user_id, &node.id);
    Ok(Json(node))
}

pub async fn delete_node(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(node_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let freed_refs = handle.delete(&node_id).await?;
    crate::logging::log_metadata_op("delete", &user_id, &node_id);
    for storage_ref in freed_refs {
        if let Err(e) = state.blob.delete(&storage_ref).await {
            crate::logging::log_orphan_chunk(&storage_ref, &format!("best-effort blob delete failed: {}", e));
        }
    }
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub struct LockBody {
    pub password: String,
}

pub async fn lock_node(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(node_id): Path<String>,
    Json(body): Json<LockBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    handle.lock(&node_id, &body.password).await?;
    crate::logging::log_metadata_op("lock", &user_id, &node_id);
    Ok(StatusCode::OK)
}

pub async fn unlock_node(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(node_id): Path<String>,
    Json(body): Json<LockBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    handle
        .unlock(&node_id, &body.password, state.config.security.override_code.clone())
        .await?;
    crate::logging::log_metadata_op("unlock", &user_id, &node_id);
    Ok(StatusCode::OK)
}

pub async fn verify_lock_node(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(node_id): Path<String>,
    Json(body): Json<LockBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let ok = handle
        .verify_lock(&node_id, &body.password, state.config.security.override_code.clone())
        .await?;
    if ok {
        Ok(StatusCode::OK)
    } else {
        Err(RivaultError::AuthFailed(format!("invalid lock secret for {}", node_id)).into())
    }
}

#[derive(Deserialize)]
pub struct CreateDriveBody {
    pub letter: String,
    pub size: u64,
}

pub async fn create_drive(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<CreateDriveBody>,
) -> ApiResult<impl IntoResponse> {
    let letter = body
        .letter
        .chars()
        .next()
        .filter(|c| c.is_ascii_alphabetic())
        .ok_or_else(|| RivaultError::BadRequest("letter must be A-Z".to_string()))?;
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    let node = handle.create_drive(letter, body.size).await?;
    crate::logging::log_metadata_op("create_drive", &user_id, &node.id);
    Ok(Json(node))
}

pub async fn delete_drive(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(drive_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;
    handle.delete_drive(&drive_id).await?;
    crate::logging::log_metadata_op("delete_drive", &user_id, &drive_id);
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchAction {
    Delete { id: String },
    Rename { id: String, name: String },
    Move { id: String, new_parent_id: String },
}

#[derive(Deserialize)]
pub struct BatchBody {
    pub actions: Vec<BatchAction>,
}

#[derive(Serialize)]
pub struct BatchActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,
}

/// Applies each action in order against the same user's actor; one action's
/// failure does not abort the rest. There is no cross-action atomicity --
/// the design explicitly scopes out transactional multi-node operations.
pub async fn batch(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<BatchBody>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id_from_headers(&headers, &state);
    let handle = state.registry.handle_for(&user_id).await?;

    let mut results = Vec::with_capacity(body.actions.len());
    for action in body.actions {
        let result = match action {
            BatchAction::Delete { id } => match handle.delete(&id).await {
                Ok(freed_refs) => {
                    for storage_ref in freed_refs {
                        let _ = state.blob.delete(&storage_ref).await;
                    }
                    BatchActionResult { success: true, error: None, node: None }
                }
                Err(e) => BatchActionResult { success: false, error: Some(e.to_string()), node: None },
            },
            BatchAction::Rename { id, name } => match handle.rename(&id, &name).await {
                Ok(node) => BatchActionResult { success: true, error: None, node: Some(node) },
                Err(e) => BatchActionResult { success: false, error: Some(e.to_string()), node: None },
            },
            BatchAction::Move { id, new_parent_id } => match handle.move_node(&id, &new_parent_id).await {
                Ok(node) => BatchActionResult { success: true, error: None, node: Some(node) },
                Err(e) => BatchActionResult { success: false, error: Some(e.to_string()), node: None },
            },
        };
        results.push(result);
    }

    Ok(Json(json!({ "results": results })))
}
