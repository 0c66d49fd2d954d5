//! Layered settings sources.
//!
//! Environment variables, a JSON file and in-code values are stacked into a
//! [`CompositeConfigProvider`]; [`Settings::load`] turns the result into a
//! client and discovery configuration.
//!
//! ```rust,no_run
//! use model_scout::config::{ConfigBuilder, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigBuilder::new()
//!     .env()
//!     .file("model-scout.json")
//!     .build()
//!     .await?;
//! let settings = Settings::load(&config).await?;
//! let client = settings.client_builder().build()?;
//! # Ok(())
//! # }
//! ```

mod composite;
mod env;
mod file;
mod memory;
mod provider;
mod settings;

pub use composite::CompositeConfigProvider;
pub use env::{DEFAULT_PREFIX, EnvConfigProvider};
pub use file::FileConfigProvider;
pub use memory::MemoryConfigProvider;
pub use provider::{ConfigProvider, ConfigProviderExt};
pub use settings::Settings;

use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "model-scout.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing setting: {key}")]
    Missing { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Provider error: {message}")]
    Provider { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Stacks settings layers; the first added has the highest priority.
#[derive(Default)]
pub struct ConfigBuilder {
    layers: Vec<Box<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `MODEL_SCOUT_*` environment variables.
    pub fn env(self) -> Self {
        self.provider(Box::new(EnvConfigProvider::new()))
    }

    pub fn env_with_prefix(self, prefix: &str) -> Self {
        self.provider(Box::new(EnvConfigProvider::prefixed(prefix)))
    }

    pub fn file(self, path: impl AsRef<Path>) -> Self {
        self.provider(Box::new(FileConfigProvider::new(path.as_ref())))
    }

    /// The per-user settings file, when the platform has a config directory.
    pub fn user_file(self) -> Self {
        match default_config_path() {
            Some(path) => self.file(path),
            None => {
                tracing::debug!("no user config directory; skipping settings file");
                self
            }
        }
    }

    pub fn memory(self, provider: MemoryConfigProvider) -> Self {
        self.provider(Box::new(provider))
    }

    pub fn provider(mut self, provider: Box<dyn ConfigProvider>) -> Self {
        self.layers.push(provider);
        self
    }

    pub async fn build(self) -> ConfigResult<CompositeConfigProvider> {
        let composite = self
            .layers
            .into_iter()
            .fold(CompositeConfigProvider::new(), |c, layer| c.provider(layer));
        tracing::debug!(layers = ?composite.provider_names(), "configuration assembled");
        Ok(composite)
    }
}

/// `<config dir>/model-scout.json` per the platform's conventions.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "model-scout", "model-scout")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_the_key() {
        let err = ConfigError::Missing {
            key: "api_key".to_string(),
        };
        assert_eq!(err.to_string(), "Missing setting: api_key");
    }

    #[test]
    fn test_builder_collects_layers() {
        let builder = ConfigBuilder::new().env().env_with_prefix("SCOUT_TEST_");
        assert_eq!(builder.layers.len(), 2);

        if let Some(path) = default_config_path() {
            assert!(path.ends_with(CONFIG_FILE_NAME));
        }
    }

    #[tokio::test]
    async fn test_builder_priority_order() {
        let config = ConfigBuilder::new()
            .memory(MemoryConfigProvider::named("overrides").value("api_version", "v1"))
            .memory(
                MemoryConfigProvider::named("defaults")
                    .value("api_version", "v1beta")
                    .value("max_retries", "5"),
            )
            .build()
            .await
            .unwrap();

        assert_eq!(config.provider_names(), vec!["overrides", "defaults"]);
        assert_eq!(
            config.get_raw("api_version").await.unwrap().as_deref(),
            Some("v1")
        );
        assert_eq!(
            config.get_raw("max_retries").await.unwrap().as_deref(),
            Some("5")
        );
    }
}
