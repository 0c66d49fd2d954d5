//! Span factories for scans, probes and individual HTTP calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{Level, Span, field};

use crate::client::{Route, TransportPath};

/// Per-client span factory. `client_id` is a non-secret label for the
/// credential in use, never the credential itself.
#[derive(Debug)]
pub struct SpanContext {
    client_id: String,
    scans: AtomicU64,
}

impl SpanContext {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scans: AtomicU64::new(0),
        }
    }

    pub fn next_scan_id(&self) -> u64 {
        self.scans.fetch_add(1, Ordering::Relaxed)
    }

    /// `candidates`, `usable` and `rejected` are recorded as the scan runs.
    pub fn scan_span(&self) -> Span {
        tracing::span!(
            Level::INFO,
            "discovery.scan",
            client_id = %self.client_id,
            scan_id = self.next_scan_id(),
            candidates = field::Empty,
            usable = field::Empty,
            rejected = field::Empty,
        )
    }

    pub fn probe_span(&self, model: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "model.probe",
            client_id = %self.client_id,
            model,
            outcome = field::Empty,
            duration_ms = field::Empty,
        )
    }

    pub fn api_call_span(&self, operation: &str, route: &Route) -> ApiCallSpan {
        ApiCallSpan::start(operation, route)
    }
}

/// One HTTP exchange. Latency is measured from creation to [`finish`](Self::finish).
pub struct ApiCallSpan {
    span: Span,
    started: Instant,
}

impl ApiCallSpan {
    pub fn start(operation: &str, route: &Route) -> Self {
        let path = match route.path {
            TransportPath::Direct => "direct",
            TransportPath::Mirror => "mirror",
        };
        let span = tracing::span!(
            Level::DEBUG,
            "api.call",
            operation,
            endpoint = route.base_url(),
            path,
            attempt = route.attempt,
            status = field::Empty,
            latency_ms = field::Empty,
        );
        Self {
            span,
            started: Instant::now(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// `status` is `None` when no response arrived.
    pub fn finish(self, status: Option<u16>) {
        let latency_ms = self.started.elapsed().as_millis() as u64;
        if let Some(status) = status {
            self.span.record("status", status);
        }
        self.span.record("latency_ms", latency_ms);
        self.span.in_scope(|| tracing::debug!(?status, latency_ms, "api call finished"));
    }
}
