//! Layered settings: the first layer that defines a key wins.

use std::collections::BTreeSet;

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

#[derive(Default)]
pub struct CompositeConfigProvider {
    layers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer below every existing one.
    pub fn add_provider(&mut self, provider: Box<dyn ConfigProvider>) {
        self.layers.push(provider);
    }

    pub fn provider(mut self, provider: Box<dyn ConfigProvider>) -> Self {
        self.add_provider(provider);
        self
    }

    pub fn provider_count(&self) -> usize {
        self.layers.len()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.layers.iter().map(|p| p.name()).collect()
    }

    /// Name of the layer that currently supplies `key`.
    pub async fn source_of(&self, key: &str) -> ConfigResult<Option<&str>> {
        for layer in &self.layers {
            if layer.get_raw(key).await?.is_some() {
                return Ok(Some(layer.name()));
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl ConfigProvider for CompositeConfigProvider {
    fn name(&self) -> &str {
        "composite"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        for layer in &self.layers {
            if let Some(value) = layer.get_raw(key).await? {
                tracing::trace!(key, layer = layer.name(), "setting resolved");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Writes go to the top layer.
    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()> {
        match self.layers.first() {
            Some(top) => top.set_raw(key, value).await,
            None => Err(ConfigError::Provider {
                message: format!("no configuration layer accepts '{key}'"),
            }),
        }
    }

    /// Removes the key from every layer so a lower one cannot resurface it.
    async fn delete(&self, key: &str) -> ConfigResult<bool> {
        let mut removed = false;
        for layer in &self.layers {
            removed |= layer.delete(key).await?;
        }
        Ok(removed)
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let mut keys = BTreeSet::new();
        for layer in &self.layers {
            keys.extend(layer.list_keys(prefix).await?);
        }
        Ok(keys.into_iter().collect())
    }
}

impl std::fmt::Debug for CompositeConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeConfigProvider")
            .field("layers", &self.provider_names())
            .finish()
    }
}
