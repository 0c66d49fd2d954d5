//! Endpoint health tracking and rotation.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::client::DEFAULT_BASE_URL;

#[derive(Clone, Debug)]
pub struct HealthConfig {
    pub failure_threshold: u32,
    pub recent_failure_window: Duration,
    pub check_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recent_failure_window: Duration::from_secs(60),
            check_interval: Duration::from_secs(60),
        }
    }
}

/// Cumulative telemetry for one endpoint.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub url: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
    pub average_latency_ms: f64,
}

impl Endpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            total_requests: 0,
            successful_requests: 0,
            consecutive_failures: 0,
            last_failure: None,
            average_latency_ms: 0.0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    pub fn failed_within(&self, window: Duration) -> bool {
        self.last_failure
            .map(|at| at.elapsed() < window)
            .unwrap_or(false)
    }

    fn score(&self, window: Duration) -> f64 {
        let penalty = if self.failed_within(window) { 0.5 } else { 1.0 };
        (self.success_rate() * penalty) / self.average_latency_ms.max(1.0)
    }
}

struct RegistryState {
    endpoints: Vec<Endpoint>,
    current: usize,
    rotated_since_traffic: bool,
}

/// Ordered set of interchangeable endpoints with one active at a time.
pub struct EndpointRegistry {
    config: HealthConfig,
    state: Mutex<RegistryState>,
    monitor: Mutex<Option<CancellationToken>>,
}

impl EndpointRegistry {
    /// Create a registry. An empty list falls back to the public API host so
    /// there is always a current endpoint.
    pub fn new(urls: impl IntoIterator<Item = impl Into<String>>, config: HealthConfig) -> Self {
        let mut endpoints: Vec<Endpoint> = urls
            .into_iter()
            .map(|u| Endpoint::new(u.into().trim_end_matches('/').to_string()))
            .collect();
        if endpoints.is_empty() {
            tracing::warn!(endpoint = DEFAULT_BASE_URL, "no endpoints given, using default");
            endpoints.push(Endpoint::new(DEFAULT_BASE_URL.to_string()));
        }
        Self {
            config,
            state: Mutex::new(RegistryState {
                endpoints,
                current: 0,
                rotated_since_traffic: false,
            }),
            monitor: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().endpoints.is_empty()
    }

    pub fn current_endpoint(&self) -> Endpoint {
        let state = self.lock();
        state.endpoints[state.current].clone()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.lock().endpoints.clone()
    }

    pub fn record_request(&self, url: &str, success: bool, latency: Option<Duration>) {
        let mut state = self.lock();
        let Some(index) = state.endpoints.iter().position(|e| e.url == url) else {
            tracing::debug!(endpoint = url, "ignoring telemetry for unknown endpoint");
            return;
        };
        state.rotated_since_traffic = false;

        let endpoint = &mut state.endpoints[index];
        endpoint.total_requests += 1;

        if success {
            endpoint.successful_requests += 1;
            endpoint.consecutive_failures = 0;
            if let Some(latency) = latency {
                let sample = latency.as_secs_f64() * 1000.0;
                let n = endpoint.successful_requests as f64;
                endpoint.average_latency_ms += (sample - endpoint.average_latency_ms) / n;
            }
            return;
        }

        endpoint.consecutive_failures += 1;
        endpoint.last_failure = Some(Instant::now());
        let failures = endpoint.consecutive_failures;

        if failures >= self.config.failure_threshold && index == state.current {
            tracing::warn!(
                endpoint = url,
                consecutive_failures = failures,
                "endpoint failure threshold reached"
            );
            Self::rotate_locked(&mut state);
        }
    }

    /// Advance to the next endpoint. Repeated calls without any recorded
    /// traffic in between rotate only once.
    pub fn rotate(&self) {
        let mut state = self.lock();
        Self::rotate_locked(&mut state);
    }

    fn rotate_locked(state: &mut RegistryState) {
        if state.rotated_since_traffic || state.endpoints.len() < 2 {
            return;
        }
        let from = state.current;
        state.current = (state.current + 1) % state.endpoints.len();
        state.rotated_since_traffic = true;
        tracing::info!(
            from = %state.endpoints[from].url,
            to = %state.endpoints[state.current].url,
            "rotated endpoint"
        );
    }

    pub fn best_endpoint(&self) -> Endpoint {
        let state = self.lock();
        state.endpoints[Self::best_index(&state.endpoints, self.config.recent_failure_window)]
            .clone()
    }

    fn best_index(endpoints: &[Endpoint], window: Duration) -> usize {
        let mut best = 0;
        let mut best_score = f64::MIN;
        for (i, endpoint) in endpoints.iter().enumerate() {
            let score = endpoint.score(window);
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        best
    }

    /// One health-check pass: move off the current endpoint only when it has
    /// failed recently and a better-scoring one exists.
    pub fn evaluate(&self) -> bool {
        let mut state = self.lock();
        let window = self.config.recent_failure_window;
        if !state.endpoints[state.current].failed_within(window) {
            return false;
        }
        let best = Self::best_index(&state.endpoints, window);
        if best == state.current {
            return false;
        }
        tracing::info!(
            from = %state.endpoints[state.current].url,
            to = %state.endpoints[best].url,
            "health check switched endpoint"
        );
        state.current = best;
        state.rotated_since_traffic = false;
        true
    }

    /// Start the periodic health check. Calling it again restarts the timer.
    pub fn start_health_monitor(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(token.clone())
        {
            previous.cancel();
        }

        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.config.check_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if token.is_cancelled() {
                            break;
                        }
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        registry.evaluate();
                    }
                }
            }
            tracing::debug!("endpoint health monitor stopped");
        });
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| !t.is_cancelled())
            .unwrap_or(false)
    }

    /// Stop the health monitor. Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(token) = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            token.cancel();
        }
    }
}

impl Drop for EndpointRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &state.endpoints.len())
            .field("current", &state.endpoints[state.current].url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "https://a.example.com";
    const B: &str = "https://b.example.com";
    const C: &str = "https://c.example.com";

    fn registry() -> EndpointRegistry {
        EndpointRegistry::new([A, B, C], HealthConfig::default())
    }

    #[test]
    fn test_starts_on_first_endpoint() {
        let registry = registry();
        assert_eq!(registry.current_endpoint().url, A);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_empty_list_uses_default_endpoint() {
        let registry = EndpointRegistry::new(Vec::<String>::new(), HealthConfig::default());
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        assert_eq!(registry.current_endpoint().url, DEFAULT_BASE_URL);
        assert_eq!(registry.best_endpoint().url, DEFAULT_BASE_URL);
        registry.rotate();
        assert!(format!("{registry:?}").contains(DEFAULT_BASE_URL));
    }

    #[test]
    fn test_threshold_rotates() {
        let registry = registry();

        registry.record_request(A, false, None);
        registry.record_request(A, false, None);
        assert_eq!(registry.current_endpoint().url, A);

        registry.record_request(A, false, None);
        assert_ne!(registry.current_endpoint().url, A);
        assert_eq!(registry.current_endpoint().url, B);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let registry = registry();

        registry.record_request(A, false, None);
        registry.record_request(A, false, None);
        registry.record_request(A, true, Some(Duration::from_millis(100)));

        let endpoint = registry.current_endpoint();
        assert_eq!(endpoint.consecutive_failures, 0);
        assert_eq!(endpoint.total_requests, 3);
        assert_eq!(endpoint.successful_requests, 1);
    }

    #[test]
    fn test_incremental_mean_latency() {
        let registry = registry();
        registry.record_request(A, true, Some(Duration::from_millis(100)));
        registry.record_request(A, true, Some(Duration::from_millis(300)));
        registry.record_request(A, true, Some(Duration::from_millis(200)));

        let avg = registry.current_endpoint().average_latency_ms;
        assert!((avg - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotate_is_idempotent_without_traffic() {
        let registry = registry();
        registry.rotate();
        registry.rotate();
        registry.rotate();
        assert_eq!(registry.current_endpoint().url, B);

        registry.record_request(B, true, None);
        registry.rotate();
        assert_eq!(registry.current_endpoint().url, C);
    }

    #[test]
    fn test_rotation_wraps_around() {
        let registry = EndpointRegistry::new([A, B], HealthConfig::default());
        registry.rotate();
        registry.record_request(B, true, None);
        registry.rotate();
        assert_eq!(registry.current_endpoint().url, A);
    }

    #[test]
    fn test_single_endpoint_never_rotates() {
        let registry = EndpointRegistry::new([A], HealthConfig::default());
        for _ in 0..5 {
            registry.record_request(A, false, None);
        }
        assert_eq!(registry.current_endpoint().url, A);
    }

    #[test]
    fn test_failures_on_inactive_endpoint_do_not_rotate() {
        let registry = registry();
        for _ in 0..3 {
            registry.record_request(C, false, None);
        }
        assert_eq!(registry.current_endpoint().url, A);
    }

    #[test]
    fn test_best_endpoint_prefers_fast_and_healthy() {
        let registry = registry();
        registry.record_request(A, true, Some(Duration::from_millis(400)));
        registry.record_request(B, true, Some(Duration::from_millis(50)));
        registry.record_request(C, true, Some(Duration::from_millis(100)));
        assert_eq!(registry.best_endpoint().url, B);

        registry.record_request(B, false, None);
        // B: (0.5 * 0.5) / 50 = 0.005, C: 1.0 / 100 = 0.01
        assert_eq!(registry.best_endpoint().url, C);
    }

    #[test]
    fn test_evaluate_only_switches_after_recent_failure() {
        let registry = registry();
        registry.record_request(A, true, Some(Duration::from_millis(500)));
        registry.record_request(B, true, Some(Duration::from_millis(10)));
        assert!(!registry.evaluate());
        assert_eq!(registry.current_endpoint().url, A);

        registry.record_request(A, false, None);
        assert!(registry.evaluate());
        assert_eq!(registry.current_endpoint().url, B);
    }

    #[test]
    fn test_unknown_endpoint_ignored() {
        let registry = registry();
        registry.record_request("https://nowhere.example.com", false, None);
        assert!(registry.endpoints().iter().all(|e| e.total_requests == 0));
    }

    #[tokio::test]
    async fn test_monitor_dispose() {
        let config = HealthConfig {
            check_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let registry = Arc::new(EndpointRegistry::new([A, B], config));
        registry.start_health_monitor();
        assert!(registry.is_monitoring());

        registry.dispose();
        assert!(!registry.is_monitoring());
        registry.dispose();
    }

    #[tokio::test]
    async fn test_disposed_monitor_never_switches() {
        let config = HealthConfig {
            check_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let registry = Arc::new(EndpointRegistry::new([A, B], config));
        registry.record_request(B, true, Some(Duration::from_millis(10)));
        registry.record_request(A, false, None);
        assert_eq!(registry.best_endpoint().url, B);

        registry.start_health_monitor();
        registry.dispose();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(registry.current_endpoint().url, A);
    }

    #[tokio::test]
    async fn test_monitor_switches_endpoint() {
        let config = HealthConfig {
            check_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let registry = Arc::new(EndpointRegistry::new([A, B], config));
        registry.record_request(B, true, Some(Duration::from_millis(10)));
        registry.record_request(A, false, None);
        registry.start_health_monitor();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.current_endpoint().url, B);
        registry.dispose();
    }
}
