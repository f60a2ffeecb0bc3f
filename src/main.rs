// ===================================================================================================
// rivault - server entry point
// ===================================================================================================

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rivault::actor::ActorRegistry;
use rivault::api::{router, ApiState};
use rivault::blob::{BlobStore, FilesystemBlobStore, SledBlobStore};
use rivault::config::Config;
use rivault::logging;

#[derive(Parser, Debug)]
#[command(name = "rivault", about = "Encrypted cloud-drive backend")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging_safe();

    let args = Args::parse();
    let config = Config::load(args.config)?;
    tracing::info!(port = config.server.port, backend = %config.storage.blob_backend, "starting rivault");

    std::fs::create_dir_all(&config.storage.data_dir)?;

    let blob: Arc<dyn BlobStore> = match config.storage.blob_backend.as_str() {
        "filesystem" => Arc::new(FilesystemBlobStore::new(config.storage.blob_dir.clone(), config.storage.max_chunk_bytes)?),
        _ => Arc::new(SledBlobStore::open(&config.storage.blob_dir, config.storage.max_chunk_bytes)?),
    };

    let registry = Arc::new(ActorRegistry::new(config.storage.data_dir.clone(), config.storage.default_drive_quota));

    let state = Arc::new(ApiState { registry, blob, config: Arc::new(config.clone()) });
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
