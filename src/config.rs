use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Rivault server configuration, loaded from TOML with environment-variable
/// overrides for the keys the dispatcher and CLI care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind port (env: PORT).
    pub port: u16,
    /// Base URL the client should address the API at (env: API_URL).
    pub api_url: String,
    /// CORS allow-list, comma-separated in the environment (env: ALLOWED_ORIGINS).
    pub allowed_origins: Vec<String>,
    /// Default user id used when a request carries no X-User-Id header (env: RIVAULT_USER).
    pub default_user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for per-user sled metadata databases.
    pub data_dir: PathBuf,
    /// Which blob backend to use: "sled" (internal keyed store) or "filesystem".
    pub blob_backend: String,
    /// Directory used by the filesystem blob backend.
    pub blob_dir: PathBuf,
    /// Maximum chunk payload size accepted by the blob adapter.
    pub max_chunk_bytes: usize,
    /// Default quota assigned to the initial drive created for a new user.
    pub default_drive_quota: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// PBKDF2-HMAC-SHA256 iteration count used by the client-side key derivation
    /// contract; recorded here so the server can validate/echo it in diagnostics.
    pub pbkdf2_iterations: u32,
    /// Optional override code that bypasses per-node locks. Disabled (None) by
    /// default; see the "universal override code" open question.
    pub override_code: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                api_url: "http://127.0.0.1:8080".to_string(),
                allowed_origins: vec!["http://localhost:3000".to_string()],
                default_user: "default".to_string(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                blob_backend: "sled".to_string(),
                blob_dir: PathBuf::from("./data/blobs"),
                max_chunk_bytes: 20 * 1024 * 1024,
                default_drive_quota: 10 * 1024 * 1024 * 1024,
            },
            security: SecurityConfig {
                pbkdf2_iterations: 100_000,
                override_code: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file if present, then apply environment
    /// overrides, falling back to defaults when neither is set.
    pub fn load(config_path: Option<PathBuf>) -> crate::error::RivaultResult<Self> {
        let mut config = if let Some(path) = &config_path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)?;
                let parsed: Config = toml::from_str(&raw)
                    .map_err(|e| crate::error::RivaultError::BadRequest(format!("config parse error: {}", e)))?;
                tracing::info!("loaded configuration from {:?}", path);
                parsed
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }
        if let Ok(api_url) = std::env::var("API_URL") {
            config.server.api_url = api_url;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            config.server.allowed_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(user) = std::env::var("RIVAULT_USER") {
            config.server.default_user = user;
        }
        if let Ok(code) = std::env::var("RIVAULT_OVERRIDE_CODE") {
            config.security.override_code = Some(code);
        }

        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> crate::error::RivaultResult<()> {
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| crate::error::RivaultError::Internal(format!("config serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, rendered)?;
        Ok(())
    }
}
