//! Client configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::auth::Credential;
use crate::{Error, Result};

use super::network::PoolConfig;
use super::resilience::{HealthConfig, RetryConfig};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v1beta";

/// How outbound connections reach the API.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// Honor proxy settings from the environment.
    #[default]
    Auto,
    /// Never use a proxy or the mirror path.
    Direct,
    /// Route everything through the given proxy URL.
    Proxy(String),
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Direct => "direct",
            Self::Proxy(_) => "proxy",
        }
    }
}

impl FromStr for TransportMode {
    type Err = Error;

    /// Accepts `auto`, `direct`, or a proxy URL.
    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim();
        match value.to_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "direct" | "none" => Ok(Self::Direct),
            _ if value.contains("://") => Ok(Self::Proxy(value.to_string())),
            other => Err(Error::Config(format!("Unknown transport mode: {}", other))),
        }
    }
}

/// Per-call timeouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub catalog: Duration,
    pub probe: Duration,
    pub generate: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            catalog: Duration::from_secs(15),
            probe: Duration::from_secs(30),
            generate: Duration::from_secs(30),
        }
    }
}

/// Validated client configuration. Built through [`super::ClientBuilder`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub credential: Credential,
    pub transport: TransportMode,
    pub endpoints: Vec<String>,
    pub mirror_url: Option<String>,
    pub api_version: String,
    pub timeouts: Timeouts,
    pub retry: RetryConfig,
    pub health: HealthConfig,
    pub pool: PoolConfig,
}

impl ClientConfig {
    /// Mirror to use on retries. Direct mode never uses one.
    pub fn effective_mirror(&self) -> Option<&str> {
        match self.transport {
            TransportMode::Direct => None,
            _ => self.mirror_url.as_deref(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config("At least one endpoint is required".into()));
        }
        for endpoint in &self.endpoints {
            validate_http_url("endpoint", endpoint)?;
        }
        if let Some(ref mirror) = self.mirror_url {
            validate_http_url("mirror_url", mirror)?;
        }
        if let TransportMode::Proxy(ref proxy) = self.transport {
            validate_http_url("proxy_url", proxy)?;
        }
        if self.api_version.trim().is_empty() || self.api_version.contains('/') {
            return Err(Error::Config(format!(
                "Invalid api_version: {:?}",
                self.api_version
            )));
        }
        if self.timeouts.catalog.is_zero()
            || self.timeouts.probe.is_zero()
            || self.timeouts.generate.is_zero()
        {
            return Err(Error::Config("Timeouts must be non-zero".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| Error::Config(format!("Invalid {} {:?}: {}", field, value, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::Config(format!(
            "Invalid {} {:?}: expected an absolute http(s) URL",
            field, value
        )));
    }
    Ok(())
}
