//! # model-scout
//!
//! Resilient model discovery and access testing for rate-limited generative
//! model APIs.
//!
//! The crate answers one question for a credential: which models can it
//! actually use right now? It fetches the remote model catalog, probes every
//! candidate with a minimal generation request, and folds the outcomes into a
//! [`DiscoveryReport`]. Along the way it retries transient failures with
//! jittered backoff, rotates between endpoints based on live health data, and
//! merges identical in-flight requests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use model_scout::{Client, Discovery};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), model_scout::Error> {
//!     let client = Client::builder()
//!         .credential(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!
//!     let discovery = Discovery::new(client);
//!     let report = discovery
//!         .discover_with_progress(|p| println!("{}/{} {}", p.current, p.total, p.model_id))
//!         .await?;
//!
//!     println!("usable: {:?}", report.usable_models);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod auth;
pub mod client;
pub mod config;
pub mod discovery;
pub mod models;
pub mod observability;
pub mod store;

pub use auth::Credential;
pub use client::{
    ClassifiedError, Client, ClientBuilder, ClientConfig, CooldownPolicy, CooldownTracker,
    Endpoint, EndpointRegistry, ErrorKind, ExponentialBackoff, HealthConfig, PoolConfig,
    ProbeSuccess, ProxyConfig, RequestCoalescer, Resilience, RetryConfig, Route, Timeouts,
    TransportMode, TransportPath, fingerprint,
};
pub use config::{
    CompositeConfigProvider, ConfigBuilder, ConfigError, ConfigProvider, ConfigProviderExt,
    EnvConfigProvider, FileConfigProvider, MemoryConfigProvider, Settings,
};
pub use discovery::{
    Discovery, DiscoveryConfig, DiscoveryReport, DiscoveryState, Progress, ProgressPhase,
    ProviderStatus, RejectedModel, TestResult,
};
pub use models::{
    Capability, EnrichmentSource, ModelDescriptor, ModelFamily, ModelRegistry, ModelTier,
    registry as model_registry,
};
pub use observability::{MetricsRegistry, SpanContext};
pub use store::{CacheStore, CatalogSnapshot, FileStore, MemoryStore, StoreError};

use std::time::Duration;

/// Everything that can go wrong talking to the model API or preparing to.
///
/// Per-model probe failures never surface as this type from a scan; they are
/// folded into the [`DiscoveryReport`] as [`ClassifiedError`]s.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Non-success HTTP response. `api_status` is the API's symbolic status,
    /// e.g. `PERMISSION_DENIED`.
    #[error("{} from model API: {message}", status.map_or_else(|| "Error".to_string(), |s| format!("HTTP {s}")))]
    Api {
        message: String,
        status: Option<u16>,
        api_status: Option<String>,
    },

    #[error("Credential rejected: {message}")]
    Auth { message: String },

    #[error("Transport failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP 429, with the server's `retry-after` hint when present.
    #[error("Throttled by model API{}: {message}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("No response within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Every attempt failed; carries the classification of the last one.
    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: ClassifiedError },

    /// Calls to a recently throttled model are held back locally.
    #[error("Model {model} is cooling down for another {}s", remaining.as_secs().max(1))]
    CoolingDown { model: String, remaining: Duration },

    #[error("Catalog cache failure: {0}")]
    Store(String),

    #[error("Environment variable unusable: {0}")]
    Env(#[from] std::env::VarError),
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => *status,
            Error::RateLimit { .. } => Some(429),
            Error::RetriesExhausted { last, .. } => last.status,
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimit { retry_after, .. } => *retry_after,
            Error::RetriesExhausted { last, .. } => last.retry_after,
            _ => None,
        }
    }

    /// Map this error onto the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Api {
                status: Some(status),
                message,
                ..
            } => client::error::classify_status(*status, message),
            Error::Api {
                status: None,
                message,
                ..
            } => client::error::classify_message(message),
            Error::RateLimit { message, .. } => client::error::classify_status(429, message),
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Network(e) if e.is_timeout() => ErrorKind::Timeout,
            Error::Network(e) => match e.status() {
                Some(status) => client::error::classify_status(status.as_u16(), &e.to_string()),
                None => ErrorKind::NetworkError,
            },
            Error::RetriesExhausted { last, .. } => last.kind,
            Error::CoolingDown { .. } => ErrorKind::RateLimited,
            Error::Auth { .. } => ErrorKind::PermissionDenied,
            Error::Json(_) | Error::Parse(_) => ErrorKind::Incompatible,
            Error::Config(_) | Error::Io(_) | Error::Store(_) | Error::Env(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Reduce this error to a cloneable classification.
    pub fn classify(&self) -> ClassifiedError {
        if let Error::RetriesExhausted { last, .. } = self {
            return last.clone();
        }
        let message = match self {
            Error::Api { message, .. } | Error::RateLimit { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ClassifiedError::new(self.kind(), self.status_code(), message)
            .with_retry_after(self.retry_after())
    }

    pub fn is_retryable(&self) -> bool {
        self.classify().is_retryable()
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::Missing { key } => Error::Config(format!("Missing setting: {key}")),
            config::ConfigError::InvalidValue { key, message } => {
                Error::Config(format!("{key}: {message}"))
            }
            config::ConfigError::Serialization(e) => Error::Json(e),
            config::ConfigError::Io(e) => Error::Io(e),
            config::ConfigError::Env(e) => Error::Env(e),
            config::ConfigError::Provider { message } => Error::Config(message),
        }
    }
}

impl From<store::StoreError> for Error {
    fn from(err: store::StoreError) -> Self {
        match err {
            store::StoreError::Io(e) => Error::Io(e),
            store::StoreError::Serialization(e) => Error::Json(e),
            other => Error::Store(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Api {
            message: "API key not valid".to_string(),
            status: Some(401),
            api_status: Some("UNAUTHENTICATED".into()),
        };
        assert_eq!(err.to_string(), "HTTP 401 from model API: API key not valid");

        let throttled = Error::RateLimit {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(
            throttled.to_string(),
            "Throttled by model API (retry after 30s): slow down"
        );
        assert_eq!(
            Error::Timeout(Duration::from_millis(1500)).to_string(),
            "No response within 1500ms"
        );
    }

    #[test]
    fn test_error_kind_mapping() {
        let forbidden = Error::Api {
            message: "Permission denied on model".into(),
            status: Some(403),
            api_status: Some("PERMISSION_DENIED".into()),
        };
        assert_eq!(forbidden.kind(), ErrorKind::PermissionDenied);

        let throttled = Error::RateLimit {
            message: "Resource has been exhausted".into(),
            retry_after: None,
        };
        assert_eq!(throttled.kind(), ErrorKind::RateLimited);
        assert_eq!(throttled.status_code(), Some(429));

        assert_eq!(
            Error::Timeout(Duration::from_secs(30)).kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn test_exhausted_classifies_as_last() {
        let last = ClassifiedError::new(ErrorKind::NetworkError, Some(503), "unavailable");
        let err = Error::RetriesExhausted {
            attempts: 3,
            last: last.clone(),
        };
        assert_eq!(err.classify(), last);
        assert_eq!(err.status_code(), Some(503));
        assert!(err.to_string().contains("3 attempt"));
    }

    #[test]
    fn test_error_is_retryable() {
        let rate_limit = Error::RateLimit {
            message: String::new(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert!(rate_limit.is_retryable());
        assert_eq!(rate_limit.classify().retry_after, Some(Duration::from_secs(5)));

        let server_error = Error::Api {
            message: "Internal error".to_string(),
            status: Some(500),
            api_status: None,
        };
        assert!(server_error.is_retryable());

        let auth_error = Error::auth("Invalid token");
        assert!(!auth_error.is_retryable());
    }

    #[test]
    fn test_config_error_conversion() {
        let config_err = config::ConfigError::Missing {
            key: "api_key".to_string(),
        };
        let err: Error = config_err.into();
        assert!(matches!(err, Error::Config(_)));
    }
}
