//! Settings from process environment variables.
//!
//! `probe_timeout_ms` is read from `MODEL_SCOUT_PROBE_TIMEOUT_MS`; dots in
//! keys become underscores. Variables set to an empty string count as unset.

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

/// Prefix used by [`EnvConfigProvider::new`].
pub const DEFAULT_PREFIX: &str = "MODEL_SCOUT_";

/// Read-only: mutating the environment of a running multi-threaded process
/// is unsound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfigProvider {
    prefix: String,
}

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self::prefixed(DEFAULT_PREFIX)
    }

    pub fn unprefixed() -> Self {
        Self::prefixed("")
    }

    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace('.', "_").to_uppercase())
    }

    fn key_from_env(&self, name: &str) -> Option<String> {
        name.strip_prefix(&self.prefix).map(str::to_lowercase)
    }
}

fn read_only(name: &str) -> ConfigError {
    ConfigError::Provider {
        message: format!("{name} is an environment variable and read-only at runtime"),
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConfigProvider for EnvConfigProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        match std::env::var(self.env_key(key)) {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    async fn set_raw(&self, key: &str, _value: &str) -> ConfigResult<()> {
        Err(read_only(&self.env_key(key)))
    }

    /// Absent variables report `false`; present ones cannot be removed.
    async fn delete(&self, key: &str) -> ConfigResult<bool> {
        let name = self.env_key(key);
        match std::env::var_os(&name) {
            None => Ok(false),
            Some(_) => Err(read_only(&name)),
        }
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let env_prefix = self.env_key(prefix);
        let mut keys: Vec<String> = std::env::vars_os()
            .filter_map(|(name, _)| name.into_string().ok())
            .filter(|name| name.starts_with(&env_prefix))
            .filter_map(|name| self.key_from_env(&name))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
