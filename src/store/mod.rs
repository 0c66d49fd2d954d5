//! Durable side-cache for the last known model catalog.
//!
//! A cold start can fall back to the last persisted [`CatalogSnapshot`] when
//! the remote catalog is unreachable.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Credential;
use crate::models::ModelDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache file {path}: {message}")]
    Corrupt { path: String, message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Key-value store for JSON documents.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>>;

    async fn put(&self, key: &str, value: serde_json::Value) -> StoreResult<()>;

    async fn remove(&self, key: &str) -> StoreResult<bool>;
}

/// Catalog as last fetched for one credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub models: Vec<ModelDescriptor>,
    pub fetched_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self {
            models,
            fetched_at: Utc::now(),
        }
    }

    /// Store key for a credential's catalog. Never contains the key itself.
    pub fn key_for(credential: &Credential) -> String {
        format!("catalog:{}", credential.cache_key())
    }

    pub fn age(&self) -> Duration {
        (Utc::now() - self.fetched_at).to_std().unwrap_or_default()
    }

    pub fn is_younger_than(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }

    pub async fn load(store: &dyn CacheStore, key: &str) -> StoreResult<Option<Self>> {
        match store.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, store: &dyn CacheStore, key: &str) -> StoreResult<()> {
        store.put(key, serde_json::to_value(self)?).await
    }
}
