//! HTTP client construction per [`TransportMode`].

use std::time::Duration;

use super::config::TransportMode;
use crate::{Error, Result};

/// Connection reuse settings. Discovery issues many short sequential calls
/// against one or two hosts, so a small warm pool suffices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub idle_timeout: Duration,
    pub max_idle_per_host: usize,
    pub tcp_keepalive: Option<Duration>,
    pub http2_keep_alive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(90),
            max_idle_per_host: 4,
            tcp_keepalive: Some(Duration::from_secs(60)),
            http2_keep_alive: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfig {
    /// No keepalives; connections are dropped quickly.
    pub fn minimal() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15),
            max_idle_per_host: 1,
            tcp_keepalive: None,
            http2_keep_alive: None,
        }
    }

    fn configure(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let builder = builder
            .pool_idle_timeout(self.idle_timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .tcp_keepalive(self.tcp_keepalive);
        match self.http2_keep_alive {
            Some(interval) => builder
                .http2_keep_alive_interval(interval)
                .http2_keep_alive_while_idle(true),
            None => builder,
        }
    }
}

/// One proxy for all schemes, honoring `NO_PROXY` exclusions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub url: String,
    pub respect_no_proxy: bool,
}

impl ProxyConfig {
    /// An explicit proxy; `NO_PROXY` is not consulted.
    pub fn all(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            respect_no_proxy: false,
        }
    }

    /// First of `HTTPS_PROXY`, `ALL_PROXY`, `HTTP_PROXY` (either case) that is set
    /// and non-empty.
    pub fn from_env() -> Option<Self> {
        ["HTTPS_PROXY", "ALL_PROXY", "HTTP_PROXY"]
            .iter()
            .flat_map(|name| [name.to_string(), name.to_lowercase()])
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .map(|url| Self {
                url,
                respect_no_proxy: true,
            })
    }

    fn to_proxy(&self) -> Result<reqwest::Proxy> {
        let proxy = reqwest::Proxy::all(&self.url)
            .map_err(|e| Error::Config(format!("Invalid proxy URL '{}': {e}", self.url)))?;
        Ok(if self.respect_no_proxy {
            proxy.no_proxy(reqwest::NoProxy::from_env())
        } else {
            proxy
        })
    }
}

/// `Auto` follows the environment's proxy variables, `Direct` ignores them
/// and `Proxy` forces the given proxy.
pub fn build_http_client(transport: &TransportMode, pool: &PoolConfig) -> Result<reqwest::Client> {
    let builder = pool.configure(reqwest::Client::builder());

    let builder = match transport {
        TransportMode::Direct => builder.no_proxy(),
        TransportMode::Proxy(url) => builder.proxy(ProxyConfig::all(url.as_str()).to_proxy()?),
        TransportMode::Auto => match ProxyConfig::from_env() {
            Some(proxy) => {
                tracing::debug!(proxy = %proxy.url, "using proxy from environment");
                builder.proxy(proxy.to_proxy()?)
            }
            None => builder,
        },
    };

    builder.build().map_err(Error::Network)
}
