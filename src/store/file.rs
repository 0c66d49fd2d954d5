//! JSON file store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{CacheStore, StoreError, StoreResult};

const APP_QUALIFIER: &str = "dev";
const APP_ORGANIZATION: &str = "model-scout";
const APP_NAME: &str = "model-scout";
const CACHE_FILE_NAME: &str = "catalog-cache.json";

/// Store backed by a single JSON object file. Writes go to a temporary file
/// that is renamed over the original.
pub struct FileStore {
    path: PathBuf,
    data: Arc<RwLock<Option<HashMap<String, serde_json::Value>>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: Arc::new(RwLock::new(None)),
        }
    }

    /// Platform cache directory location, if one can be determined.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.cache_dir().join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<HashMap<String, serde_json::Value>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    async fn save(&self, data: &HashMap<String, serde_json::Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let mut guard = self.data.write().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(guard.as_ref().and_then(|data| data.get(key).cloned()))
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        let mut guard = self.data.write().await;
        let mut data = match guard.take() {
            Some(data) => data,
            None => self.load().await?,
        };
        data.insert(key.to_string(), value);
        let saved = self.save(&data).await;
        *guard = Some(data);
        saved
    }

    async fn remove(&self, key: &str) -> StoreResult<bool> {
        let mut guard = self.data.write().await;
        let mut data = match guard.take() {
            Some(data) => data,
            None => self.load().await?,
        };
        let removed = data.remove(key).is_some();
        let saved = if removed { self.save(&data).await } else { Ok(()) };
        *guard = Some(data);
        saved.map(|_| removed)
    }
}
