//! Failure taxonomy shared by retry decisions and discovery reports.

use serde::{Deserialize, Serialize};

/// Closed set of failure classes a remote call can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkError,
    PermissionDenied,
    NotFound,
    RateLimited,
    QuotaExhausted,
    Timeout,
    Incompatible,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Timeout => "timeout",
            Self::Incompatible => "incompatible",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reduced to its class plus the facts retry and reporting need.
///
/// Unlike [`crate::Error`] this is `Clone`, so it can be shared between
/// coalesced callers and stored in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    #[serde(skip)]
    pub retry_after: Option<std::time::Duration>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<std::time::Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Throttled rather than refused: the model exists but the backend asked
    /// us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429) || self.kind == ErrorKind::RateLimited
    }

    pub fn is_retryable(&self) -> bool {
        if matches!(self.status, Some(429) | Some(500..=599)) {
            return true;
        }
        matches!(
            self.kind,
            ErrorKind::NetworkError | ErrorKind::Timeout | ErrorKind::RateLimited
        )
    }

    /// Rejections caused by the model itself rather than the credential or
    /// the network path.
    pub fn is_model_scoped(&self) -> bool {
        match self.kind {
            ErrorKind::PermissionDenied => self.status != Some(401),
            ErrorKind::NotFound | ErrorKind::Incompatible => true,
            _ => false,
        }
    }

    /// Whether this failure says something about the endpoint that served it.
    /// A model-scoped rejection means the endpoint answered correctly.
    pub fn reflects_endpoint_health(&self) -> bool {
        !self.is_model_scoped()
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Classify an HTTP error response.
pub fn classify_status(status: u16, body: &str) -> ErrorKind {
    let lower = body.to_lowercase();
    match status {
        401 | 403 => ErrorKind::PermissionDenied,
        404 => ErrorKind::NotFound,
        408 => ErrorKind::Timeout,
        429 if is_hard_quota(&lower) => ErrorKind::QuotaExhausted,
        429 => ErrorKind::RateLimited,
        400 if mentions_incompatibility(&lower) => ErrorKind::Incompatible,
        500..=599 => ErrorKind::NetworkError,
        _ => classify_message(body),
    }
}

/// Classify a failure from its message alone.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") || lower.contains("deadline") {
        ErrorKind::Timeout
    } else if is_hard_quota(&lower) {
        ErrorKind::QuotaExhausted
    } else if lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("resource_exhausted")
        || lower.contains("resource exhausted")
    {
        ErrorKind::RateLimited
    } else if lower.contains("permission")
        || lower.contains("forbidden")
        || lower.contains("unauthorized")
        || lower.contains("api key not valid")
    {
        ErrorKind::PermissionDenied
    } else if lower.contains("not found") || lower.contains("not_found") {
        ErrorKind::NotFound
    } else if mentions_incompatibility(&lower) {
        ErrorKind::Incompatible
    } else if lower.contains("network")
        || lower.contains("connection")
        || lower.contains("connect")
        || lower.contains("dns")
        || lower.contains("econn")
        || lower.contains("fetch")
        || lower.contains("unavailable")
    {
        ErrorKind::NetworkError
    } else {
        ErrorKind::Unknown
    }
}

fn is_hard_quota(lower: &str) -> bool {
    lower.contains("exceeded your current quota")
        || (lower.contains("quota")
            && (lower.contains("per day") || lower.contains("daily") || lower.contains("billing")))
}

fn mentions_incompatibility(lower: &str) -> bool {
    lower.contains("not supported")
        || lower.contains("unsupported")
        || lower.contains("incompatible")
}
