use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://developer.api.autodesk.com";

/// Scopes requested when FORGE_SCOPE is not set
pub const DEFAULT_SCOPE: &[&str] = &[
    "data:read",
    "data:create",
    "data:write",
    "bucket:read",
    "bucket:create",
];

const MAX_CHUNK_SIZE: usize = 100 * 1024 * 1024;

/// Client configuration
///
/// Passed explicitly to [`crate::ViewDataClient::new`]; build it with
/// [`ClientConfig::new`] or load it from the environment with
/// [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // Service
    pub base_url: String,

    // Two-legged credentials
    pub client_id: String,
    pub client_secret: String,
    pub scope: Vec<String>,

    // Storage
    pub default_bucket_key: String,

    // HTTP
    pub http_timeout: Duration,

    // Resumable upload
    pub chunk_size: usize,
    pub max_parallel_chunks: usize,

    // Translation polling
    pub translation_timeout: Duration,
    pub translation_interval: Duration,

    // Derivative download target
    pub download_dir: PathBuf,
}

impl ClientConfig {
    /// Configuration with default settings for the given credentials
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: DEFAULT_SCOPE.iter().map(|s| s.to_string()).collect(),
            default_bucket_key: String::new(),
            http_timeout: Duration::from_secs(120),
            chunk_size: 5 * 1024 * 1024,
            max_parallel_chunks: 4,
            translation_timeout: Duration::from_secs(5 * 60),
            translation_interval: Duration::from_secs(10),
            download_dir: PathBuf::from("./download"),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Required environment variables:
    /// - FORGE_CLIENTID: application client id
    /// - FORGE_CLIENTSECRET: application client secret
    ///
    /// Optional environment variables (with defaults):
    /// - FORGE_BASE_URL: service root (default: https://developer.api.autodesk.com)
    /// - FORGE_BUCKET_KEY: bucket used by upload/workflow commands (default: empty)
    /// - FORGE_SCOPE: space or comma separated scopes (default: data + bucket read/create/write)
    /// - HTTP_TIMEOUT_SECONDS: per-request timeout (default: 120)
    /// - UPLOAD_CHUNK_SIZE_BYTES: resumable upload chunk size (default: 5 MiB)
    /// - UPLOAD_MAX_PARALLEL_CHUNKS: chunks in flight at once (default: 4)
    /// - TRANSLATION_TIMEOUT_SECONDS: how long to wait for a translation (default: 300)
    /// - TRANSLATION_INTERVAL_SECONDS: delay between status checks (default: 10)
    /// - DOWNLOAD_DIR: where derivatives are written (default: ./download)
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenv::dotenv().ok();

        let client_id = env::var("FORGE_CLIENTID")
            .context("FORGE_CLIENTID environment variable is required")?;

        let client_secret = env::var("FORGE_CLIENTSECRET")
            .context("FORGE_CLIENTSECRET environment variable is required")?;

        let mut config = Self::new(client_id, client_secret);

        if let Ok(base_url) = env::var("FORGE_BASE_URL") {
            config.base_url = base_url;
        }

        if let Ok(bucket_key) = env::var("FORGE_BUCKET_KEY") {
            config.default_bucket_key = bucket_key;
        }

        if let Ok(scope) = env::var("FORGE_SCOPE") {
            config.scope = parse_scope(&scope);
        }

        config.http_timeout = Duration::from_secs(
            env_number("HTTP_TIMEOUT_SECONDS", config.http_timeout.as_secs())?,
        );

        config.chunk_size = env_number("UPLOAD_CHUNK_SIZE_BYTES", config.chunk_size as u64)? as usize;

        config.max_parallel_chunks =
            env_number("UPLOAD_MAX_PARALLEL_CHUNKS", config.max_parallel_chunks as u64)? as usize;

        config.translation_timeout = Duration::from_secs(env_number(
            "TRANSLATION_TIMEOUT_SECONDS",
            config.translation_timeout.as_secs(),
        )?);

        config.translation_interval = Duration::from_secs(env_number(
            "TRANSLATION_INTERVAL_SECONDS",
            config.translation_interval.as_secs(),
        )?);

        if let Ok(dir) = env::var("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("Base URL cannot be empty");
        }

        if self.client_id.is_empty() {
            anyhow::bail!("Client ID cannot be empty");
        }

        if self.client_secret.is_empty() {
            anyhow::bail!("Client secret cannot be empty");
        }

        if self.scope.is_empty() {
            anyhow::bail!("At least one scope must be requested");
        }

        let timeout = self.http_timeout.as_secs();
        if timeout == 0 || timeout > 600 {
            anyhow::bail!("HTTP timeout must be between 1 and 600 seconds");
        }

        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!("Upload chunk size must be between 1 byte and 100 MiB");
        }

        if self.max_parallel_chunks == 0 {
            anyhow::bail!("Upload parallelism must be at least 1");
        }

        if self.translation_interval.is_zero() {
            anyhow::bail!("Translation poll interval must be positive");
        }

        Ok(())
    }
}

/// Split a scope list on spaces and/or commas
pub fn parse_scope(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn env_number(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}
