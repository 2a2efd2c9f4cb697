use thiserror::Error;

use crate::models::Config;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("cache max_bytes must be greater than zero")]
    ZeroCacheBudget,
    #[error("storage max_bytes must be greater than zero when set")]
    ZeroStorageBudget,
    #[error("server port must not be zero")]
    ZeroPort,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.server.port == 0 {
        return Err(ConfigGuardRailError::ZeroPort);
    }
    if config.cache.max_bytes.is_zero() {
        return Err(ConfigGuardRailError::ZeroCacheBudget);
    }
    if config.storage.max_bytes.is_some_and(|max| max.is_zero()) {
        return Err(ConfigGuardRailError::ZeroStorageBudget);
    }

    if config.cache.enabled && config.cache.max_populate_bytes > config.cache.max_bytes {
        warnings.push_with_hint(
            format!(
                "cache.max_populate_bytes ({}) exceeds cache.max_bytes ({}); one video can flush the whole cache",
                config.cache.max_populate_bytes, config.cache.max_bytes
            ),
            "Lower VIDEO_CACHE_MAX_POPULATE_BYTES below VIDEO_CACHE_MAX_BYTES",
        );
    }

    if config.cors.is_wildcard_included() {
        warnings.push_with_hint(
            "CORS allows any origin",
            "List the frontend origins in CORS_ALLOWED_ORIGINS instead of *",
        );
    }

    if config.retention.min_access_count == 0 {
        warnings.push(
            "retention.min_access_count is 0; the retention sweep will never delete anything",
        );
    }

    if !config.retention.sweeper_enabled() {
        warnings.push_with_hint(
            "Background retention sweep disabled",
            "Set RETENTION_INTERVAL to a non-zero duration to enable it",
        );
    }

    Ok(warnings)
}
