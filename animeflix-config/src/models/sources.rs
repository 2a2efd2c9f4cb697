use std::path::PathBuf;

use animeflix_model::ByteSize;
use serde::Deserialize;

use crate::util::{parse_bool, parse_byte_size, parse_csv, parse_duration};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub storage: FileStorageConfig,
    #[serde(default)]
    pub cache: FileCacheConfig,
    #[serde(default)]
    pub retention: FileRetentionConfig,
    #[serde(default)]
    pub cors: FileCorsConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileStorageConfig {
    pub root: Option<PathBuf>,
    pub max_bytes: Option<ByteSize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileCacheConfig {
    pub enabled: Option<bool>,
    pub root: Option<PathBuf>,
    pub max_bytes: Option<ByteSize>,
    pub max_populate_bytes: Option<ByteSize>,
    pub preload_count: Option<usize>,
}

/// Durations are humantime strings, e.g. `"30days"` or `"24h"`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileRetentionConfig {
    pub max_age: Option<String>,
    pub min_access_count: Option<u64>,
    pub interval: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileCorsConfig {
    pub allowed_origins: Option<Vec<String>>,
}

/// Environment-derived configuration values.
///
/// Values that are present but fail to parse are kept in `invalid` so the
/// loader can report them instead of silently using a default.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub storage_root: Option<PathBuf>,
    pub storage_max_bytes: Option<ByteSize>,
    pub cache_enabled: Option<bool>,
    pub cache_root: Option<PathBuf>,
    pub cache_max_bytes: Option<ByteSize>,
    pub cache_max_populate_bytes: Option<ByteSize>,
    pub cache_preload_count: Option<usize>,
    pub retention_max_age: Option<std::time::Duration>,
    pub retention_min_access_count: Option<u64>,
    pub retention_interval: Option<std::time::Duration>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub invalid: Vec<InvalidEnvValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEnvValue {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvParser {
            lookup,
            invalid: Vec::new(),
        };

        let mut env_config = Self {
            config_path: env.raw("ANIMEFLIX_CONFIG").map(PathBuf::from),
            server_host: env.raw("SERVER_HOST"),
            server_port: env.parsed("SERVER_PORT", |s| {
                s.trim().parse::<u16>().map_err(|e| e.to_string())
            }),
            storage_root: env.raw("VIDEO_STORAGE_PATH").map(PathBuf::from),
            storage_max_bytes: env.parsed("VIDEO_STORAGE_MAX_BYTES", parse_byte_size),
            cache_enabled: env.parsed("VIDEO_CACHE_ENABLED", |s| {
                parse_bool(s).ok_or_else(|| "expected a boolean".to_string())
            }),
            cache_root: env.raw("VIDEO_CACHE_DIR").map(PathBuf::from),
            cache_max_bytes: env.parsed("VIDEO_CACHE_MAX_BYTES", parse_byte_size),
            cache_max_populate_bytes: env
                .parsed("VIDEO_CACHE_MAX_POPULATE_BYTES", parse_byte_size),
            cache_preload_count: env.parsed("VIDEO_CACHE_PRELOAD_COUNT", |s| {
                s.trim().parse::<usize>().map_err(|e| e.to_string())
            }),
            retention_max_age: env.parsed("RETENTION_MAX_AGE", parse_duration),
            retention_min_access_count: env.parsed("RETENTION_MIN_ACCESS_COUNT", |s| {
                s.trim().parse::<u64>().map_err(|e| e.to_string())
            }),
            retention_interval: env.parsed("RETENTION_INTERVAL", parse_duration),
            cors_allowed_origins: env.raw("CORS_ALLOWED_ORIGINS").map(|raw| parse_csv(&raw)),
            invalid: Vec::new(),
        };
        env_config.invalid = env.invalid;
        env_config
    }
}

struct EnvParser<F> {
    lookup: F,
    invalid: Vec<InvalidEnvValue>,
}

impl<F> EnvParser<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn parsed<T>(
        &mut self,
        name: &'static str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Option<T> {
        let value = self.raw(name)?;
        match parse(&value) {
            Ok(parsed) => Some(parsed),
            Err(reason) => {
                self.invalid.push(InvalidEnvValue {
                    name,
                    value,
                    reason,
                });
                None
            }
        }
    }
}
