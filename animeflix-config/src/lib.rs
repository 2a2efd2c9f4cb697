//! Configuration for the Animeflix server.
//!
//! Values come from built-in defaults, an optional TOML file and the process
//! environment (after loading `.env` when present). Environment beats file,
//! file beats default.

pub mod loader;
pub mod models;
mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig, InvalidEnvValue};
pub use models::{
    CacheConfig, Config, ConfigMetadata, CorsConfig, RetentionConfig, ServerConfig,
    StorageConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
