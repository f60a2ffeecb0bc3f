// ===================================================================================================
// CLI command implementations
// ===================================================================================================
//
// Out of the core per the design (the HTTP surface is the authoritative
// interface); this is a thin `reqwest` client that does the client-side half
// of envelope encryption the server never performs: deriving the master key,
// generating and wrapping the data key, and sealing/opening each chunk.
// ===================================================================================================

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::json;

use crate::crypto::{self, secure_random, SealedBox};
use crate::metadata::{EncryptionHeader, Node, NodeKind, SealedHex};

const CHUNK_SIZE: usize = 5 * 1024 * 1024;
const SALT_LEN: usize = 16;

pub struct CliContext {
    pub client: reqwest::Client,
    pub api_url: String,
    pub user: String,
}

impl CliContext {
    pub fn new(api_url: String, user: String) -> Self {
        Self { client: reqwest::Client::new(), api_url, user }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("request failed ({}): {}", status, body))
    }
}

pub async fn ls(ctx: &CliContext, folder_id: &str) -> Result<()> {
    let response = ctx
        .client
        .get(ctx.url(&format!("/folders/{}", folder_id)))
        .header("X-User-Id", &ctx.user)
        .send()
        .await?;
    let response = ensure_success(response).await?;
    let nodes: Vec<Node> = response.json().await?;

    for node in nodes {
        let size = match &node.kind {
            NodeKind::File { size, .. } => size.to_string(),
            NodeKind::Drive { usage, quota, .. } => format!("{}/{}", usage, quota),
            _ => "-".to_string(),
        };
        println!("{}\t{}\t{}", node.kind.type_name(), size, node.name);
    }
    Ok(())
}

pub async fn upload(ctx: &CliContext, folder_id: &str, path: &Path, password: &str) -> Result<()> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("reading {:?}", path))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("path has no file name"))?
        .to_string();
    let mime_type = guess_mime_type(&name);

    let mut salt = [0u8; SALT_LEN];
    secure_random::fill_secure_bytes(&mut salt);
    let master_key = crypto::derive_master_key(password, &salt);
    let data_key = crypto::generate_data_key();
    let wrapped = crypto::wrap_data_key(&data_key, &master_key)?;

    let encryption = EncryptionHeader {
        salt: hex::encode(salt),
        wrapped_key: sealed_to_hex(&wrapped),
    };

    let create_body = json!({
        "parent_id": folder_id,
        "name": name,
        "size": bytes.len() as u64,
        "mime_type": mime_type,
        "encryption": encryption,
        "overwrite": true,
    });
    let response = ctx
        .client
        .post(ctx.url("/files"))
        .header("X-User-Id", &ctx.user)
        .json(&create_body)
        .send()
        .await?;
    let response = ensure_success(response).await?;
    let node: Node = response.json().await?;

    for (order, plaintext_chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
        let sealed = crypto::seal(plaintext_chunk, &data_key)?;
        let wire = sealed.to_wire();
        let response = ctx
            .client
            .post(ctx.url(&format!("/files/{}/chunks?order={}", node.id, order)))
            .header("X-User-Id", &ctx.user)
            .header("Content-Type", "application/octet-stream")
            .body(wire)
            .send()
            .await?;
        ensure_success(response).await?;
    }

    println!("uploaded {} as {}", name, node.id);
    Ok(())
}

pub async fn download(ctx: &CliContext, file_id: &str, path: &Path, password: &str) -> Result<()> {
    let response = ctx
        .client
        .get(ctx.url(&format!("/files/{}", file_id)))
        .header("X-User-Id", &ctx.user)
        .send()
        .await?;
    let response = ensure_success(response).await?;
    let node: Node = response.json().await?;

    let (size, chunk_size, encryption) = match node.kind {
        NodeKind::File { size, chunk_size, encryption, .. } => (size, chunk_size, encryption),
        _ => return Err(anyhow!("{} is not a file", file_id)),
    };
    let encryption = encryption.ok_or_else(|| anyhow!("{} has no encryption header", file_id))?;

    let salt = hex::decode(&encryption.salt).context("decoding salt")?;
    let master_key = crypto::derive_master_key(password, &salt);
    let wrapped = sealed_from_hex(&encryption.wrapped_key)?;
    let data_key = crypto::unwrap_data_key(&wrapped, &master_key)?;

    let response = ctx
        .client
        .get(ctx.url(&format!("/files/{}/download", file_id)))
        .header("X-User-Id", &ctx.user)
        .send()
        .await?;
    let response = ensure_success(response).await?;
    let wire = response.bytes().await?;

    let plaintext = decrypt_chunk_stream(&wire, size, chunk_size, &data_key)?;
    tokio::fs::write(path, plaintext).await.with_context(|| format!("writing {:?}", path))?;
    println!("downloaded {} to {:?}", file_id, path);
    Ok(())
}

/// Splits the concatenated wire stream back into chunks using the file's
/// declared plaintext size and its own recorded chunk size -- the stream
/// itself carries no delimiters, since ciphertext length equals plaintext
/// length for AES-GCM plus the fixed IV+tag prefix. The chunk size must
/// match the value the file was uploaded with (`Node::File.chunk_size`),
/// not the CLI's current default, since a file uploaded by an older client
/// or with a different setting may have chunked it differently.
fn decrypt_chunk_stream(wire: &[u8], total_size: u64, chunk_size: u64, data_key: &[u8; 32]) -> Result<Vec<u8>> {
    const OVERHEAD: usize = crypto::IV_LEN + crypto::TAG_LEN;
    let chunk_size = chunk_size as usize;
    let mut remaining = total_size as usize;
    let mut offset = 0usize;
    let mut plaintext = Vec::with_capacity(total_size as usize);

    while remaining > 0 {
        let chunk_plain_len = remaining.min(chunk_size);
        let wire_len = OVERHEAD + chunk_plain_len;
        let chunk_wire = wire
            .get(offset..offset + wire_len)
            .ok_or_else(|| anyhow!("download stream shorter than expected"))?;
        let sealed = SealedBox::from_wire(chunk_wire)?;
        let opened = crypto::open(&sealed, data_key)?;
        plaintext.extend_from_slice(&opened);
        offset += wire_len;
        remaining -= chunk_plain_len;
    }

    Ok(plaintext)
}

pub async fn rm(ctx: &CliContext, id: &str) -> Result<()> {
    let response = ctx
        .client
        .delete(ctx.url(&format!("/nodes/{}", id)))
        .header("X-User-Id", &ctx.user)
        .send()
        .await?;
    ensure_success(response).await?;
    println!("deleted {}", id);
    Ok(())
}

pub async fn rename(ctx: &CliContext, id: &str, name: &str) -> Result<()> {
    let response = ctx
        .client
        .post(ctx.url(&format!("/nodes/{}/rename", id)))
        .header("X-User-Id", &ctx.user)
        .json(&json!({ "name": name }))
        .send()
        .await?;
    ensure_success(response).await?;
    println!("renamed {} to {}", id, name);
    Ok(())
}

pub async fn mv(ctx: &CliContext, id: &str, new_parent_id: &str) -> Result<()> {
    let response = ctx
        .client
        .post(ctx.url(&format!("/nodes/{}/move", id)))
        .header("X-User-Id", &ctx.user)
        .json(&json!({ "new_parent_id": new_parent_id }))
        .send()
        .await?;
    ensure_success(response).await?;
    println!("moved {} to {}", id, new_parent_id);
    Ok(())
}

fn sealed_to_hex(sealed: &SealedBox) -> SealedHex {
    SealedHex {
        iv: hex::encode(sealed.iv),
        ciphertext: hex::encode(&sealed.ciphertext),
        auth_tag: hex::encode(sealed.tag),
    }
}

fn sealed_from_hex(hex_box: &SealedHex) -> Result<SealedBox> {
    let iv_bytes = hex::decode(&hex_box.iv)?;
    let tag_bytes = hex::decode(&hex_box.auth_tag)?;
    if iv_bytes.len() != crypto::IV_LEN || tag_bytes.len() != crypto::TAG_LEN {
        return Err(anyhow!("malformed encryption header"));
    }
    let mut iv = [0u8; crypto::IV_LEN];
    iv.copy_from_slice(&iv_bytes);
    let mut tag = [0u8; crypto::TAG_LEN];
    tag.copy_from_slice(&tag_bytes);
    Ok(SealedBox { iv, ciphertext: hex::decode(&hex_box.ciphertext)?, tag })
}

fn guess_mime_type(name: &str) -> String {
    match name.rsplit('.').next().unwrap_or("") {
        "txt" => "text/plain",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

