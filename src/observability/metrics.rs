//! Process-local counters for probing, retries and catalog caching.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Upper bounds of the probe latency buckets. Probes slower than the last
/// bound land in an overflow bucket.
const LATENCY_BOUNDS_MS: [u64; 10] = [
    50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 20_000, 30_000,
];

/// Fixed-bucket latency histogram with microsecond sums.
#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<Duration>,
    buckets: Vec<AtomicU64>,
    total_micros: AtomicU64,
}

impl Histogram {
    pub fn new(bounds: impl IntoIterator<Item = Duration>) -> Self {
        let mut bounds: Vec<Duration> = bounds.into_iter().collect();
        bounds.sort();
        bounds.dedup();
        let buckets = std::iter::repeat_with(AtomicU64::default)
            .take(bounds.len() + 1)
            .collect();
        Self {
            bounds,
            buckets,
            total_micros: AtomicU64::new(0),
        }
    }

    pub fn probe_latency() -> Self {
        Self::new(LATENCY_BOUNDS_MS.map(Duration::from_millis))
    }

    pub fn observe(&self, latency: Duration) {
        let slot = self.bounds.partition_point(|bound| *bound < latency);
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.bucket_counts().iter().sum()
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    pub fn mean(&self) -> Option<Duration> {
        let count = self.count();
        (count > 0)
            .then(|| Duration::from_micros(self.total_micros.load(Ordering::Relaxed) / count))
    }

    /// Upper bound of the bucket holding the `q` quantile. `None` when empty
    /// or when the quantile falls in the overflow bucket.
    pub fn quantile(&self, q: f64) -> Option<Duration> {
        let counts = self.bucket_counts();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return None;
        }
        let rank = ((q.clamp(0.0, 1.0) * total as f64).ceil() as u64).max(1);
        let mut seen = 0;
        for (slot, count) in counts.iter().enumerate() {
            seen += count;
            if seen >= rank {
                return self.bounds.get(slot).copied();
            }
        }
        None
    }
}

pub struct MetricsRegistry {
    pub probes_total: Counter,
    pub probes_usable: Counter,
    pub probes_rejected: Counter,
    pub probes_rate_limited: Counter,
    pub retries: Counter,
    pub rotations: Counter,
    pub coalesced_joins: Counter,
    pub cache_fallbacks: Counter,
    pub active_scans: Gauge,
    pub probe_latency: Histogram,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            probes_total: Counter::new(),
            probes_usable: Counter::new(),
            probes_rejected: Counter::new(),
            probes_rate_limited: Counter::new(),
            retries: Counter::new(),
            rotations: Counter::new(),
            coalesced_joins: Counter::new(),
            cache_fallbacks: Counter::new(),
            active_scans: Gauge::new(),
            probe_latency: Histogram::probe_latency(),
        }
    }

    pub fn record_scan_start(&self) {
        self.active_scans.inc();
    }

    pub fn record_scan_end(&self) {
        self.active_scans.dec();
    }

    /// Throttled probes count as usable as well as rate limited.
    pub fn record_probe(&self, usable: bool, rate_limited: bool, latency: Option<Duration>) {
        self.probes_total.inc();
        if usable {
            self.probes_usable.inc();
        } else {
            self.probes_rejected.inc();
        }
        if rate_limited {
            self.probes_rate_limited.inc();
        }
        if let Some(latency) = latency {
            self.probe_latency.observe(latency);
        }
    }

    pub fn record_retry(&self) {
        self.retries.inc();
    }

    pub fn record_rotation(&self) {
        self.rotations.inc();
    }

    pub fn record_coalesced(&self) {
        self.coalesced_joins.inc();
    }

    pub fn record_cache_fallback(&self) {
        self.cache_fallbacks.inc();
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary::from_registry(self)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("summary", &self.summary())
            .finish()
    }
}

/// Snapshot suitable for logging or JSON export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub probes: u64,
    pub usable: u64,
    pub rejected: u64,
    pub rate_limited: u64,
    pub retries: u64,
    pub rotations: u64,
    pub coalesced_joins: u64,
    pub cache_fallbacks: u64,
    pub active_scans: i64,
    pub mean_probe_latency_ms: Option<u64>,
    pub p95_probe_latency_ms: Option<u64>,
}

impl MetricsSummary {
    pub fn from_registry(registry: &MetricsRegistry) -> Self {
        let as_ms = |d: Duration| d.as_millis() as u64;
        Self {
            probes: registry.probes_total.get(),
            usable: registry.probes_usable.get(),
            rejected: registry.probes_rejected.get(),
            rate_limited: registry.probes_rate_limited.get(),
            retries: registry.retries.get(),
            rotations: registry.rotations.get(),
            coalesced_joins: registry.coalesced_joins.get(),
            cache_fallbacks: registry.cache_fallbacks.get(),
            active_scans: registry.active_scans.get(),
            mean_probe_latency_ms: registry.probe_latency.mean().map(as_ms),
            p95_probe_latency_ms: registry.probe_latency.quantile(0.95).map(as_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_counter_and_gauge() {
        let counter = Counter::new();
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);

        let gauge = Gauge::new();
        gauge.inc();
        gauge.inc();
        gauge.dec();
        assert_eq!(gauge.get(), 1);
        gauge.set(-3);
        assert_eq!(gauge.get(), -3);
    }

    #[test]
    fn test_histogram_bucketing_is_inclusive() {
        let hist = Histogram::new([ms(100), ms(10), ms(50), ms(50)]);
        for latency in [5, 10, 25, 75, 150] {
            hist.observe(ms(latency));
        }

        assert_eq!(hist.bucket_counts(), vec![2, 1, 1, 1]);
        assert_eq!(hist.count(), 5);
        assert_eq!(hist.mean(), Some(ms(53)));
    }

    #[test]
    fn test_histogram_quantiles() {
        let hist = Histogram::probe_latency();
        assert_eq!(hist.quantile(0.5), None);
        assert_eq!(hist.mean(), None);

        for _ in 0..19 {
            hist.observe(ms(80));
        }
        hist.observe(ms(900));

        assert_eq!(hist.quantile(0.5), Some(ms(100)));
        assert_eq!(hist.quantile(0.95), Some(ms(100)));
        assert_eq!(hist.quantile(1.0), Some(ms(1_000)));

        hist.observe(ms(45_000));
        assert_eq!(hist.quantile(1.0), None);
    }

    #[test]
    fn test_probe_accounting() {
        let registry = MetricsRegistry::default();
        registry.record_scan_start();
        registry.record_probe(true, false, Some(ms(120)));
        registry.record_probe(true, true, None);
        registry.record_probe(false, false, Some(ms(80)));
        registry.record_retry();
        registry.record_coalesced();

        let summary = registry.summary();
        assert_eq!(summary.probes, 3);
        assert_eq!(summary.usable, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.rate_limited, 1);
        assert_eq!(summary.retries, 1);
        assert_eq!(summary.coalesced_joins, 1);
        assert_eq!(summary.active_scans, 1);
        assert_eq!(summary.mean_probe_latency_ms, Some(100));
        assert_eq!(summary.p95_probe_latency_ms, Some(250));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["rateLimited"], 1);
    }
}
