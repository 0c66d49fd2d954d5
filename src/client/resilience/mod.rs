//! Resilience layer for the model API client.
//!
//! Retries transient failures with jittered exponential backoff, switches to
//! the mirror path and rotates endpoints on later attempts, and feeds every
//! outcome into the endpoint health registry.

mod backoff;
mod health;

pub use backoff::ExponentialBackoff;
pub use health::{Endpoint, EndpointRegistry, HealthConfig};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::error::ClassifiedError;
use crate::observability::MetricsRegistry;
use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
    pub rate_limit_floor: Duration,
    pub mirror_on_attempt: u32,
    pub rotate_on_attempt: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: ExponentialBackoff::default(),
            rate_limit_floor: Duration::from_secs(8),
            mirror_on_attempt: 2,
            rotate_on_attempt: 3,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_rate_limit_floor(mut self, floor: Duration) -> Self {
        self.rate_limit_floor = floor;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportPath {
    Direct,
    Mirror,
}

/// Where a single attempt should be sent.
#[derive(Clone, Debug)]
pub struct Route {
    /// Registry endpoint the attempt is accounted against.
    pub endpoint: String,
    pub path: TransportPath,
    pub attempt: u32,
    mirror_url: Option<String>,
}

impl Route {
    pub fn direct(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: TransportPath::Direct,
            attempt: 1,
            mirror_url: None,
        }
    }

    /// Base URL the request goes to.
    pub fn base_url(&self) -> &str {
        match (&self.path, &self.mirror_url) {
            (TransportPath::Mirror, Some(mirror)) => mirror,
            _ => &self.endpoint,
        }
    }
}

pub struct Resilience {
    config: RetryConfig,
    registry: Arc<EndpointRegistry>,
    mirror_url: Option<String>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Resilience {
    pub fn new(config: RetryConfig, registry: Arc<EndpointRegistry>) -> Self {
        Self {
            config,
            registry,
            mirror_url: None,
            metrics: None,
        }
    }

    pub fn with_mirror(mut self, mirror_url: Option<String>) -> Self {
        self.mirror_url = mirror_url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn route_for(&self, attempt: u32) -> Route {
        let endpoint = self.registry.current_endpoint().url;
        let path = if attempt == self.config.mirror_on_attempt && self.mirror_url.is_some() {
            TransportPath::Mirror
        } else {
            TransportPath::Direct
        };
        Route {
            endpoint,
            path,
            attempt,
            mirror_url: self.mirror_url.clone(),
        }
    }

    /// Run `operation` until it succeeds, fails terminally, or runs out of
    /// attempts. Each attempt is bounded by `timeout`.
    pub async fn execute<T, F, Fut>(&self, timeout: Duration, mut operation: F) -> Result<T>
    where
        F: FnMut(Route) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut rate_limit_retried = false;
        let mut attempt = 0;

        loop {
            attempt += 1;

            if attempt > 1 && attempt == self.config.rotate_on_attempt {
                self.rotate();
            }

            let route = self.route_for(attempt);
            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, operation(route.clone())).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(timeout)),
            };

            let error = match outcome {
                Ok(value) => {
                    self.record(&route, true, Some(started.elapsed()));
                    return Ok(value);
                }
                Err(e) => e,
            };

            let classified = error.classify();
            self.record(&route, !classified.reflects_endpoint_health(), None);

            if !classified.is_retryable() {
                return Err(error);
            }

            let throttled = classified.is_rate_limited() || classified.status == Some(429);
            if attempt >= max_attempts || (throttled && rate_limit_retried) {
                return Err(self.exhausted(attempt, classified));
            }

            let delay = if throttled {
                rate_limit_retried = true;
                self.config.backoff.rate_limit_delay(
                    attempt,
                    self.config.rate_limit_floor,
                    classified.retry_after,
                )
            } else {
                self.config.backoff.delay_for(attempt)
            };

            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                kind = %classified.kind,
                endpoint = %route.base_url(),
                "retrying after failure"
            );
            if let Some(ref metrics) = self.metrics {
                metrics.record_retry();
            }
            tokio::time::sleep(delay).await;
        }
    }

    fn exhausted(&self, attempts: u32, last: ClassifiedError) -> Error {
        tracing::debug!(attempts, kind = %last.kind, "retries exhausted");
        Error::RetriesExhausted { attempts, last }
    }

    fn rotate(&self) {
        let before = self.registry.current_endpoint().url;
        self.registry.rotate();
        if self.registry.current_endpoint().url != before
            && let Some(ref metrics) = self.metrics
        {
            metrics.record_rotation();
        }
    }

    // Mirror traffic says nothing about the registry endpoint.
    fn record(&self, route: &Route, success: bool, latency: Option<Duration>) {
        if route.path == TransportPath::Direct {
            self.registry
                .record_request(&route.endpoint, success, latency);
        }
    }
}

impl std::fmt::Debug for Resilience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resilience")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("mirror_url", &self.mirror_url)
            .finish()
    }
}
