//! JSON settings file.
//!
//! Keys may address nested objects with dots (`timeouts.probe_ms`) for both
//! reads and writes. Leaf strings come back verbatim; every other JSON value
//! comes back as its JSON text.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

type Document = Map<String, Value>;

pub struct FileConfigProvider {
    path: PathBuf,
    /// Parsed document, loaded on first access.
    document: RwLock<Option<Document>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the cached document and read the file again.
    pub async fn reload(&self) -> ConfigResult<()> {
        let fresh = read_document(&self.path).await?;
        *self.document.write().await = Some(fresh);
        Ok(())
    }

    async fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> ConfigResult<R> {
        {
            let guard = self.document.read().await;
            if let Some(doc) = guard.as_ref() {
                return Ok(f(doc));
            }
        }
        let mut guard = self.document.write().await;
        if guard.is_none() {
            *guard = Some(read_document(&self.path).await?);
        }
        Ok(f(guard.get_or_insert_with(Document::new)))
    }

    async fn update<R>(&self, f: impl FnOnce(&mut Document) -> R) -> ConfigResult<R> {
        let mut guard = self.document.write().await;
        if guard.is_none() {
            *guard = Some(read_document(&self.path).await?);
        }
        let doc = guard.get_or_insert_with(Document::new);
        let out = f(&mut *doc);
        write_document(&self.path, doc).await?;
        Ok(out)
    }
}

async fn read_document(path: &Path) -> ConfigResult<Document> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(Document::new());
    }
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map),
        other => Err(ConfigError::InvalidValue {
            key: path.display().to_string(),
            message: format!("expected a JSON object, found {}", json_type(&other)),
        }),
    }
}

/// Write through a sibling temp file so readers never see a partial document.
async fn write_document(path: &Path, doc: &Document) -> ConfigResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(doc)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn lookup<'a>(doc: &'a Document, key: &str) -> Option<&'a Value> {
    let mut segments = key.split('.');
    let first = doc.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| value.get(segment))
}

fn insert(doc: &mut Document, key: &str, value: Value) {
    let mut segments: Vec<&str> = key.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };
    let mut node = doc;
    for segment in segments {
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
    node.insert(leaf.to_string(), value);
}

fn remove(doc: &mut Document, key: &str) -> bool {
    match key.rsplit_once('.') {
        None => doc.remove(key).is_some(),
        Some((parent, leaf)) => {
            let mut node = doc;
            for segment in parent.split('.') {
                match node.get_mut(segment) {
                    Some(Value::Object(next)) => node = next,
                    _ => return false,
                }
            }
            node.remove(leaf).is_some()
        }
    }
}

/// Dotted paths of every leaf value.
fn leaf_keys(doc: &Document, base: &str, out: &mut Vec<String>) {
    for (name, value) in doc {
        let path = if base.is_empty() {
            name.clone()
        } else {
            format!("{base}.{name}")
        };
        match value {
            Value::Object(child) if !child.is_empty() => leaf_keys(child, &path, out),
            _ => out.push(path),
        }
    }
}

#[async_trait::async_trait]
impl ConfigProvider for FileConfigProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        self.with_document(|doc| match lookup(doc, key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        })
        .await
    }

    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()> {
        // Valid JSON is stored typed; anything else as a string.
        let value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        self.update(|doc| insert(doc, key, value)).await
    }

    async fn delete(&self, key: &str) -> ConfigResult<bool> {
        if self.get_raw(key).await?.is_none() {
            return Ok(false);
        }
        self.update(|doc| remove(doc, key)).await
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        self.with_document(|doc| {
            let mut keys = Vec::new();
            leaf_keys(doc, "", &mut keys);
            keys.retain(|k| k.starts_with(prefix));
            keys.sort();
            keys
        })
        .await
    }
}

impl std::fmt::Debug for FileConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigProvider")
            .field("path", &self.path)
            .finish()
    }
}
