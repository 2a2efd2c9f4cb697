pub mod sources;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use animeflix_model::ByteSize;

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub retention: RetentionConfig,
    pub cors: CorsConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Content store settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub max_bytes: Option<ByteSize>,
}

/// Byte cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub root: PathBuf,
    pub max_bytes: ByteSize,
    /// Largest single video copied into the cache on a miss or warm-up.
    pub max_populate_bytes: ByteSize,
    /// Videos warmed into the cache at startup.
    pub preload_count: usize,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub max_age: Duration,
    pub min_access_count: u64,
    /// Period of the background sweep. Zero disables it.
    pub interval: Duration,
}

impl RetentionConfig {
    pub fn sweeper_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin.trim() == "*")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

pub(crate) mod defaults {
    use animeflix_model::ByteSize;
    use std::time::Duration;

    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 5000;
    pub const STORAGE_ROOT: &str = "./videos";
    pub const CACHE_ROOT: &str = "./video-cache";
    pub const CACHE_MAX_BYTES: ByteSize = ByteSize::from_gib(10);
    pub const CACHE_MAX_POPULATE_BYTES: ByteSize = ByteSize::from_mib(256);
    pub const CACHE_PRELOAD_COUNT: usize = 5;
    pub const RETENTION_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);
    pub const RETENTION_MIN_ACCESS_COUNT: u64 = 5;
    pub const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn cors_origins() -> Vec<String> {
        vec!["http://localhost:3050".to_string()]
    }
}
