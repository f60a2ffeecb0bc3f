use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging for the Rivault server.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("rivault=debug")
        } else {
            EnvFilter::new("rivault=info")
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    info!("rivault logging initialized");
    Ok(())
}

/// Initialize logging, falling back to eprintln if the global subscriber
/// could not be installed (e.g. a test binary already installed one).
pub fn init_logging_safe() {
    if let Err(e) = init_logging() {
        eprintln!("warning: failed to set up tracing subscriber: {}", e);
    }
}

pub fn log_metadata_op(operation: &str, user_id: &str, detail: &str) {
    info!(target: "rivault::metadata", "{} user={}: {}", operation, user_id, detail);
}

pub fn log_chunk_op(operation: &str, file_id: &str, detail: &str) {
    info!(target: "rivault::chunk", "{} file={}: {}", operation, file_id, detail);
}

pub fn log_orphan_chunk(storage_ref: &str, reason: &str) {
    tracing::warn!(target: "rivault::chunk", "orphaned blob {}: {}", storage_ref, reason);
}
