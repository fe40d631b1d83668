use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    // Primary store
    pub database_url: String,

    // Streaming sidecar (pgwire). Subscriptions are unavailable when unset.
    pub streaming_url: Option<String>,

    // API settings
    pub api_host: String,
    pub api_port: u16,
    pub request_timeout_seconds: u64,
    pub shutdown_timeout_seconds: u64,

    // Ingestion
    pub insert_batch_size: usize,

    // Type registry caching
    pub type_cache_ttl_seconds: u64,

    // Whether the streaming source accepts `WITH (SNAPSHOT = false)`.
    // When false, snapshot skipping falls back to watermark filtering.
    pub streaming_snapshot_clause: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            streaming_url: env::var("STREAMING_URL").ok().filter(|s| !s.is_empty()),

            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            shutdown_timeout_seconds: env::var("SHUTDOWN_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            insert_batch_size: env::var("INSERT_BATCH_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),

            type_cache_ttl_seconds: env::var("TYPE_CACHE_TTL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),

            streaming_snapshot_clause: env::var("STREAMING_SNAPSHOT_CLAUSE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
