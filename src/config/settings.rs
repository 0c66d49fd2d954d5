//! Typed settings read from any [`ConfigProvider`].
//!
//! Recognized keys:
//!
//! | key | meaning |
//! |---|---|
//! | `api_key` | credential |
//! | `transport` | `auto`, `direct`, or a proxy URL |
//! | `proxy_url` | proxy URL, implies proxy transport when `transport` is unset |
//! | `endpoints` | JSON array or comma-separated base URLs |
//! | `mirror_url` | fallback forwarding path |
//! | `api_version` | path segment, e.g. `v1beta` |
//! | `max_retries` | retries after the first attempt |
//! | `catalog_timeout_ms`, `probe_timeout_ms` | per-call timeouts |
//! | `probe_delay_ms` | pause between probes during a scan |
//! | `cache_file` | side-cache location |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};
use crate::client::{ClientBuilder, TransportMode};
use crate::discovery::DiscoveryConfig;
use crate::store::FileStore;

pub const KEY_API_KEY: &str = "api_key";
pub const KEY_TRANSPORT: &str = "transport";
pub const KEY_PROXY_URL: &str = "proxy_url";
pub const KEY_ENDPOINTS: &str = "endpoints";
pub const KEY_MIRROR_URL: &str = "mirror_url";
pub const KEY_API_VERSION: &str = "api_version";
pub const KEY_MAX_RETRIES: &str = "max_retries";
pub const KEY_CATALOG_TIMEOUT_MS: &str = "catalog_timeout_ms";
pub const KEY_PROBE_TIMEOUT_MS: &str = "probe_timeout_ms";
pub const KEY_PROBE_DELAY_MS: &str = "probe_delay_ms";
pub const KEY_CACHE_FILE: &str = "cache_file";

/// Settings with every field optional; unset fields keep library defaults.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub api_key: Option<SecretString>,
    pub transport: Option<TransportMode>,
    pub proxy_url: Option<String>,
    pub endpoints: Vec<String>,
    pub mirror_url: Option<String>,
    pub api_version: Option<String>,
    pub max_retries: Option<u32>,
    pub catalog_timeout: Option<Duration>,
    pub probe_timeout: Option<Duration>,
    pub probe_delay: Option<Duration>,
    pub cache_file: Option<PathBuf>,
}

impl Settings {
    pub async fn load(provider: &dyn ConfigProvider) -> ConfigResult<Self> {
        let transport = match non_empty(provider, KEY_TRANSPORT).await? {
            Some(raw) => Some(TransportMode::from_str(&raw).map_err(|e| {
                ConfigError::InvalidValue {
                    key: KEY_TRANSPORT.into(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let endpoints = match non_empty(provider, KEY_ENDPOINTS).await? {
            Some(raw) => parse_list(KEY_ENDPOINTS, &raw)?,
            None => Vec::new(),
        };

        let settings = Self {
            api_key: non_empty(provider, KEY_API_KEY)
                .await?
                .map(SecretString::from),
            transport,
            proxy_url: non_empty(provider, KEY_PROXY_URL).await?,
            endpoints,
            mirror_url: non_empty(provider, KEY_MIRROR_URL).await?,
            api_version: non_empty(provider, KEY_API_VERSION).await?,
            max_retries: parse_number(provider, KEY_MAX_RETRIES).await?,
            catalog_timeout: parse_millis(provider, KEY_CATALOG_TIMEOUT_MS).await?,
            probe_timeout: parse_millis(provider, KEY_PROBE_TIMEOUT_MS).await?,
            probe_delay: parse_millis(provider, KEY_PROBE_DELAY_MS).await?,
            cache_file: non_empty(provider, KEY_CACHE_FILE)
                .await?
                .map(PathBuf::from),
        };

        tracing::debug!(
            provider = provider.name(),
            has_api_key = settings.api_key.is_some(),
            endpoints = settings.endpoints.len(),
            "settings loaded"
        );
        Ok(settings)
    }

    /// Transport after folding in `proxy_url`.
    pub fn effective_transport(&self) -> TransportMode {
        match (&self.transport, &self.proxy_url) {
            (Some(mode), _) => mode.clone(),
            (None, Some(url)) => TransportMode::Proxy(url.clone()),
            (None, None) => TransportMode::Auto,
        }
    }

    /// A client builder preloaded with these settings.
    pub fn client_builder(&self) -> ClientBuilder {
        let mut builder = ClientBuilder::default().transport(self.effective_transport());

        if let Some(key) = &self.api_key {
            builder = builder.credential(key.expose_secret());
        }
        if !self.endpoints.is_empty() {
            builder = builder.endpoints(self.endpoints.iter().cloned());
        }
        if let Some(url) = &self.mirror_url {
            builder = builder.mirror(url.clone());
        }
        if let Some(version) = &self.api_version {
            builder = builder.api_version(version.clone());
        }
        if let Some(retries) = self.max_retries {
            builder = builder.max_attempts(retries.saturating_add(1));
        }
        if let Some(timeout) = self.catalog_timeout {
            builder = builder.catalog_timeout(timeout);
        }
        if let Some(timeout) = self.probe_timeout {
            builder = builder.probe_timeout(timeout);
        }
        builder
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        let config = DiscoveryConfig::default();
        match self.probe_delay {
            Some(delay) => config.with_probe_delay(delay),
            None => config,
        }
    }

    /// Side-cache location: `cache_file` or the platform cache directory.
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_file.clone().or_else(FileStore::default_path)
    }
}

async fn non_empty(provider: &dyn ConfigProvider, key: &str) -> ConfigResult<Option<String>> {
    Ok(provider
        .get_raw(key)
        .await?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

async fn parse_number<T>(provider: &dyn ConfigProvider, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(provider, key).await? {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{}: {:?}", e, raw),
            }),
        None => Ok(None),
    }
}

async fn parse_millis(provider: &dyn ConfigProvider, key: &str) -> ConfigResult<Option<Duration>> {
    Ok(parse_number::<u64>(provider, key)
        .await?
        .map(Duration::from_millis))
}

fn parse_list(key: &str, raw: &str) -> ConfigResult<Vec<String>> {
    if raw.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(raw).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        });
    }
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}
