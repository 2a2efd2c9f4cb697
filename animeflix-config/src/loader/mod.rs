pub mod error;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::models::sources::{EnvConfig, FileConfig};
use crate::models::{
    CacheConfig, Config, ConfigMetadata, CorsConfig, RetentionConfig, ServerConfig,
    StorageConfig, defaults,
};
use crate::util::parse_duration;
use crate::validation::{self, ConfigWarnings};
use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("animeflix.toml"),
        PathBuf::from("config/animeflix.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, then resolve against the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let mut load = self.load_from_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolve against an explicit environment snapshot. Does not touch
    /// `.env` or the process environment.
    pub fn load_from_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        self.compose_config(file_config, env, config_path)
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, required) = if let Some(explicit) = &self.options.config_path {
            (Some(explicit.clone()), true)
        } else if let Some(from_env) = &env.config_path {
            (Some(from_env.clone()), true)
        } else {
            (
                DEFAULT_CONFIG_LOCATIONS
                    .iter()
                    .find(|candidate| candidate.exists())
                    .cloned(),
                false,
            )
        };

        let Some(path) = path else {
            return Ok((None, None));
        };
        if !path.exists() {
            if required {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if file_config.is_none() {
            warnings.push_with_hint(
                "No animeflix.toml detected; using environment variables and defaults",
                "Create animeflix.toml or set ANIMEFLIX_CONFIG to point at one",
            );
        }
        for invalid in &env.invalid {
            warnings.push_with_hint(
                format!(
                    "Ignoring {}={:?}: {}",
                    invalid.name, invalid.value, invalid.reason
                ),
                "Fix or unset the variable; the file value or default is used instead",
            );
        }

        let FileConfig {
            server: file_server,
            storage: file_storage,
            cache: file_cache,
            retention: file_retention,
            cors: file_cors,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| defaults::HOST.to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(defaults::PORT),
        };

        let storage = StorageConfig {
            root: env
                .storage_root
                .or(file_storage.root)
                .unwrap_or_else(|| PathBuf::from(defaults::STORAGE_ROOT)),
            max_bytes: env.storage_max_bytes.or(file_storage.max_bytes),
        };

        let cache = CacheConfig {
            enabled: env.cache_enabled.or(file_cache.enabled).unwrap_or(true),
            root: env
                .cache_root
                .or(file_cache.root)
                .unwrap_or_else(|| PathBuf::from(defaults::CACHE_ROOT)),
            max_bytes: env
                .cache_max_bytes
                .or(file_cache.max_bytes)
                .unwrap_or(defaults::CACHE_MAX_BYTES),
            max_populate_bytes: env
                .cache_max_populate_bytes
                .or(file_cache.max_populate_bytes)
                .unwrap_or(defaults::CACHE_MAX_POPULATE_BYTES),
            preload_count: env
                .cache_preload_count
                .or(file_cache.preload_count)
                .unwrap_or(defaults::CACHE_PRELOAD_COUNT),
        };

        let retention = RetentionConfig {
            max_age: match env.retention_max_age {
                Some(age) => age,
                None => file_duration(
                    "retention.max_age",
                    file_retention.max_age,
                    defaults::RETENTION_MAX_AGE,
                )?,
            },
            min_access_count: env
                .retention_min_access_count
                .or(file_retention.min_access_count)
                .unwrap_or(defaults::RETENTION_MIN_ACCESS_COUNT),
            interval: match env.retention_interval {
                Some(interval) => interval,
                None => file_duration(
                    "retention.interval",
                    file_retention.interval,
                    defaults::RETENTION_INTERVAL,
                )?,
            },
        };

        let cors = CorsConfig {
            allowed_origins: env
                .cors_allowed_origins
                .or(file_cors.allowed_origins)
                .unwrap_or_else(defaults::cors_origins),
        };

        let config = Config {
            server,
            storage,
            cache,
            retention,
            cors,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok(ConfigLoad { config, warnings })
    }
}

fn file_duration(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        None => Ok(default),
        Some(value) => parse_duration(&value).map_err(|reason| {
            ConfigLoadError::InvalidValue { key, value, reason }
        }),
    }
}
