//! Discovery orchestrator: list the models a credential can see, probe each
//! one, and fold the outcomes into a [`DiscoveryReport`].
//!
//! A scan moves through [`DiscoveryState`] as
//! `Idle → DiscoveringCandidates → Testing → Completed`. Candidates are
//! probed one at a time with a pause in between, and every candidate is
//! probed: throttling on one model never cuts the scan short. The only error
//! a scan returns is a catalog failure with no usable cached snapshot.

mod report;
mod state;

pub use report::{DiscoveryReport, ProviderStatus, RejectedModel, TestResult};
pub use state::{DiscoveryState, Progress, ProgressPhase};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::Result;
use crate::client::{ClassifiedError, Client, CooldownPolicy, ErrorKind};
use crate::models::ModelDescriptor;
use crate::observability::MetricsRegistry;
use crate::store::{CacheStore, CatalogSnapshot};

#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// Pause between consecutive probes. Never applied after the last one.
    pub probe_delay: Duration,
    /// How long a fetched catalog is reused in memory. Zero disables reuse.
    pub catalog_ttl: Duration,
    /// Oldest persisted snapshot accepted when the catalog call fails.
    pub fallback_max_age: Duration,
    pub probe_cooldown: CooldownPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_delay: Duration::from_millis(1000),
            catalog_ttl: Duration::from_secs(5 * 60),
            fallback_max_age: Duration::from_secs(24 * 60 * 60),
            probe_cooldown: CooldownPolicy::Ignore,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_catalog_ttl(mut self, ttl: Duration) -> Self {
        self.catalog_ttl = ttl;
        self
    }

    pub fn with_fallback_max_age(mut self, max_age: Duration) -> Self {
        self.fallback_max_age = max_age;
        self
    }

    pub fn with_probe_cooldown(mut self, policy: CooldownPolicy) -> Self {
        self.probe_cooldown = policy;
        self
    }
}

struct CachedCatalog {
    fetched_at: Instant,
    models: Vec<ModelDescriptor>,
}

pub struct Discovery {
    client: Client,
    config: DiscoveryConfig,
    store: Option<Arc<dyn CacheStore>>,
    state: Mutex<DiscoveryState>,
    catalog: Mutex<Option<CachedCatalog>>,
    scan_lock: tokio::sync::Mutex<()>,
}

impl Discovery {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            config: DiscoveryConfig::default(),
            store: None,
            state: Mutex::new(DiscoveryState::Idle),
            catalog: Mutex::new(None),
            scan_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist fetched catalogs and fall back to them when the catalog call
    /// fails.
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn state(&self) -> DiscoveryState {
        *lock(&self.state)
    }

    /// Drop the in-memory catalog so the next scan fetches a fresh one.
    pub fn invalidate_catalog(&self) {
        lock(&self.catalog).take();
    }

    pub async fn discover(&self) -> Result<DiscoveryReport> {
        self.discover_with_progress(|_| {}).await
    }

    /// Run a full scan, reporting progress synchronously from the scan task.
    /// Concurrent calls run one after another.
    pub async fn discover_with_progress<F>(&self, mut on_progress: F) -> Result<DiscoveryReport>
    where
        F: FnMut(&Progress),
    {
        let _scan = self.scan_lock.lock().await;
        let span = self.client.spans().scan_span();
        let metrics = Arc::clone(self.client.metrics());

        metrics.record_scan_start();
        let mut guard = ScanGuard {
            discovery: self,
            metrics,
            finished: false,
        };
        let result = self
            .scan(&mut on_progress)
            .instrument(span.clone())
            .await;
        guard.finished = true;
        drop(guard);

        if let Ok(report) = &result {
            span.record("usable", report.usable_models.len());
            span.record("rejected", report.rejected_models.len());
        }
        result
    }

    async fn scan<F>(&self, on_progress: &mut F) -> Result<DiscoveryReport>
    where
        F: FnMut(&Progress),
    {
        self.set_state(DiscoveryState::DiscoveringCandidates);

        let candidates = match self.list_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "candidate discovery failed");
                self.set_state(DiscoveryState::Idle);
                return Err(e);
            }
        };

        let total = candidates.len();
        tracing::Span::current().record("candidates", total);
        tracing::info!(candidates = total, "probing candidates");

        let mut results = Vec::with_capacity(total);
        for (index, candidate) in candidates.iter().enumerate() {
            self.set_state(DiscoveryState::Testing {
                current: index,
                total,
            });
            on_progress(&Progress::started(index, total, &candidate.id));

            results.push(self.test_descriptor(candidate).await);

            self.set_state(DiscoveryState::Testing {
                current: index + 1,
                total,
            });
            on_progress(&Progress::finished(index, total, &candidate.id));

            if index + 1 < total && !self.config.probe_delay.is_zero() {
                tokio::time::sleep(self.config.probe_delay).await;
            }
        }

        let report = DiscoveryReport::from_results(results);
        on_progress(&Progress::completed(total));
        self.set_state(DiscoveryState::Completed);

        tracing::info!(
            usable = report.usable_models.len(),
            rejected = report.rejected_models.len(),
            rate_limited = report.rate_limited_count,
            status = ?report.provider_status,
            "discovery completed"
        );
        Ok(report)
    }

    /// Models worth probing: the in-memory catalog while fresh, otherwise
    /// the remote catalog, otherwise a recent persisted snapshot.
    pub async fn list_candidates(&self) -> Result<Vec<ModelDescriptor>> {
        if let Some(models) = self.fresh_catalog() {
            tracing::debug!(models = models.len(), "using cached catalog");
            return Ok(models);
        }

        match self.fetch_candidates().await {
            Ok(models) => {
                self.remember_catalog(&models);
                self.persist_catalog(&models).await;
                Ok(models)
            }
            Err(e) => match self.fallback_catalog().await {
                Some(models) => {
                    tracing::warn!(
                        error = %e,
                        models = models.len(),
                        "catalog unavailable, using persisted snapshot"
                    );
                    self.client.metrics().record_cache_fallback();
                    Ok(models)
                }
                None => Err(e),
            },
        }
    }

    /// Probe a single model outside of a scan.
    pub async fn test_model(&self, model_id: &str) -> TestResult {
        let descriptor = self.client.model_registry().enrich(model_id);
        self.test_descriptor(&descriptor).await
    }

    async fn test_descriptor(&self, descriptor: &ModelDescriptor) -> TestResult {
        let model_id = descriptor.id.as_str();
        let span = self.client.spans().probe_span(model_id);
        let policy = self.config.probe_cooldown;
        let cooldowns = self.client.cooldowns();

        let result = async {
            if policy.enforces()
                && let Some(remaining) = cooldowns.remaining(model_id)
            {
                tracing::debug!(
                    model = model_id,
                    remaining_ms = remaining.as_millis() as u64,
                    "skipping probe, model cooling down"
                );
                let throttled = ClassifiedError::new(
                    ErrorKind::RateLimited,
                    None,
                    format!("cooling down for another {}s", remaining.as_secs()),
                );
                return TestResult::failure(model_id, throttled, descriptor.capabilities.clone());
            }

            match self.client.probe(model_id).await {
                Ok(success) => {
                    TestResult::success(model_id, success.latency, descriptor.capabilities.clone())
                }
                Err(error) => {
                    if policy.records() && error.is_rate_limited() {
                        cooldowns.mark(model_id, error.retry_after);
                    }
                    TestResult::failure(model_id, error, descriptor.capabilities.clone())
                }
            }
        }
        .instrument(span.clone())
        .await;

        let outcome = match (&result.error, result.rate_limited) {
            (None, _) => "usable",
            (Some(_), true) => "rate_limited",
            (Some(_), false) => "rejected",
        };
        span.record("outcome", outcome);
        if let Some(latency) = result.latency {
            span.record("duration_ms", latency.as_millis() as u64);
        }
        self.client.metrics().record_probe(
            result.accessible,
            result.rate_limited,
            result.latency,
        );

        match &result.error {
            Some(error) if !result.rate_limited => {
                tracing::info!(
                    model = model_id,
                    kind = %error.kind,
                    status = ?error.status,
                    "model rejected"
                );
            }
            Some(_) => tracing::info!(model = model_id, "model throttled, counted as usable"),
            None => tracing::debug!(model = model_id, "model usable"),
        }
        result
    }

    async fn fetch_candidates(&self) -> Result<Vec<ModelDescriptor>> {
        let remote = self.client.list_models().await?;
        let registry = self.client.model_registry();

        let mut seen = HashSet::new();
        let models: Vec<ModelDescriptor> = remote
            .iter()
            .map(|m| registry.enrich_remote(m))
            .filter(|d| seen.insert(d.id.clone()))
            .collect();

        tracing::debug!(
            listed = remote.len(),
            candidates = models.len(),
            "catalog fetched"
        );
        Ok(models)
    }

    fn fresh_catalog(&self) -> Option<Vec<ModelDescriptor>> {
        if self.config.catalog_ttl.is_zero() {
            return None;
        }
        lock(&self.catalog)
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.config.catalog_ttl)
            .map(|c| c.models.clone())
    }

    fn remember_catalog(&self, models: &[ModelDescriptor]) {
        *lock(&self.catalog) = Some(CachedCatalog {
            fetched_at: Instant::now(),
            models: models.to_vec(),
        });
    }

    fn store_key(&self) -> String {
        CatalogSnapshot::key_for(&self.client.config().credential)
    }

    async fn persist_catalog(&self, models: &[ModelDescriptor]) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = CatalogSnapshot::new(models.to_vec());
        if let Err(e) = snapshot.save(store.as_ref(), &self.store_key()).await {
            tracing::warn!(store = store.name(), error = %e, "failed to persist catalog snapshot");
        }
    }

    async fn fallback_catalog(&self) -> Option<Vec<ModelDescriptor>> {
        let store = self.store.as_ref()?;
        match CatalogSnapshot::load(store.as_ref(), &self.store_key()).await {
            Ok(Some(snapshot)) if snapshot.is_younger_than(self.config.fallback_max_age) => {
                Some(snapshot.models)
            }
            Ok(Some(snapshot)) => {
                tracing::debug!(
                    age_secs = snapshot.age().as_secs(),
                    "persisted snapshot too old for fallback"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(store = store.name(), error = %e, "failed to read catalog snapshot");
                None
            }
        }
    }

    fn set_state(&self, state: DiscoveryState) {
        *lock(&self.state) = state;
    }
}

/// Balances the active-scan gauge and, when a scan future is dropped
/// mid-flight, puts the orchestrator back to `Idle`.
struct ScanGuard<'a> {
    discovery: &'a Discovery,
    metrics: Arc<MetricsRegistry>,
    finished: bool,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_scan_end();
        if !self.finished {
            tracing::warn!("scan abandoned before completion");
            self.discovery.set_state(DiscoveryState::Idle);
        }
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("store", &self.store.as_ref().map(|s| s.name().to_string()))
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
