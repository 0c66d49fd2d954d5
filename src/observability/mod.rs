//! Observability for discovery runs.
//!
//! - **Metrics**: atomic counters, a gauge and a latency histogram shared
//!   through `Arc<MetricsRegistry>`
//! - **Spans**: structured `tracing` spans for scans, probes and API calls

mod metrics;
mod spans;

pub use metrics::{Counter, Gauge, Histogram, MetricsRegistry, MetricsSummary};
pub use spans::{ApiCallSpan, SpanContext};
