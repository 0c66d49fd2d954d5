//! HTTP client for the model API with retries, endpoint rotation and
//! request coalescing.

pub mod api;
pub mod coalesce;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod network;
pub mod resilience;

pub use api::{GenerateRequest, GenerateResponse, ListModelsResponse, RemoteModel};
pub use coalesce::{RequestCoalescer, fingerprint};
pub use config::{ClientConfig, DEFAULT_API_VERSION, DEFAULT_BASE_URL, Timeouts, TransportMode};
pub use cooldown::{CooldownPolicy, CooldownTracker};
pub use error::{ClassifiedError, ErrorKind};
pub use network::{PoolConfig, ProxyConfig};
pub use resilience::{
    Endpoint, EndpointRegistry, ExponentialBackoff, HealthConfig, Resilience, RetryConfig, Route,
    TransportPath,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::auth::{ChainProvider, Credential, CredentialProvider};
use crate::models::ModelRegistry;
use crate::observability::{MetricsRegistry, SpanContext};
use crate::{Error, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_CATALOG_PAGES: usize = 50;
const CREDENTIAL_LABEL_CHARS: usize = 8;

/// A successful probe: the model accepted a minimal generation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSuccess {
    pub model_id: String,
    pub latency: Duration,
    pub endpoint: String,
    pub model_version: Option<String>,
}

/// Probe outcomes are shared between coalesced callers, so failures travel
/// as [`ClassifiedError`].
pub type ProbeOutcome = std::result::Result<ProbeSuccess, ClassifiedError>;

#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    resilience: Arc<Resilience>,
    coalescer: Arc<RequestCoalescer<ProbeOutcome>>,
    cooldowns: Arc<CooldownTracker>,
    models: Arc<ModelRegistry>,
    metrics: Arc<MetricsRegistry>,
    spans: Arc<SpanContext>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Build a client with the credential resolved from the environment.
    pub async fn from_env() -> Result<Self> {
        let credential = ChainProvider::default().resolve().await?;
        Self::builder()
            .credential(credential.expose().to_string())
            .build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Arc<EndpointRegistry> {
        self.resilience.registry()
    }

    pub fn resilience(&self) -> &Resilience {
        &self.resilience
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub fn model_registry(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn spans(&self) -> &SpanContext {
        &self.spans
    }

    /// Number of distinct probes currently in flight.
    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }

    /// Stop background work. The client stays usable for direct calls.
    pub fn dispose(&self) {
        self.endpoints().dispose();
    }

    /// Fetch every catalog page and keep models that accept generation calls.
    pub async fn list_models(&self) -> Result<Vec<RemoteModel>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_CATALOG_PAGES {
            let token = page_token.take();
            let page = self
                .resilience
                .execute(self.config.timeouts.catalog, |route| {
                    let token = token.clone();
                    async move { self.fetch_catalog_page(&route, token.as_deref()).await }
                })
                .await?;

            models.extend(
                page.models
                    .into_iter()
                    .filter(|m| m.supports_generation()),
            );

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => return Ok(models),
            }
        }

        tracing::warn!(pages = MAX_CATALOG_PAGES, "catalog paging limit reached");
        Ok(models)
    }

    /// Check whether the credential can call `model_id`. Identical probes
    /// already in flight are joined instead of repeated.
    pub async fn probe(&self, model_id: &str) -> ProbeOutcome {
        let model_id = model_id
            .strip_prefix("models/")
            .unwrap_or(model_id)
            .to_string();
        let request = GenerateRequest::probe();
        let payload = serde_json::to_string(&request).unwrap_or_default();
        let key = fingerprint(
            &format!("{}:generateContent", model_id),
            &payload,
            &self.config.credential.prefix(CREDENTIAL_LABEL_CHARS),
        );

        let client = self.clone();
        self.coalescer
            .coalesce(key, move || async move {
                client.probe_uncoalesced(&model_id, &request).await
            })
            .await
    }

    async fn probe_uncoalesced(&self, model_id: &str, request: &GenerateRequest) -> ProbeOutcome {
        let started = Instant::now();
        let result = self
            .resilience
            .execute(self.config.timeouts.probe, |route| async move {
                let response = self.generate_content(&route, model_id, request).await?;
                Ok::<_, Error>((response, route.base_url().to_string()))
            })
            .await;

        match result {
            Ok((response, endpoint)) => Ok(ProbeSuccess {
                model_id: model_id.to_string(),
                latency: started.elapsed(),
                endpoint,
                model_version: response.model_version,
            }),
            Err(e) => Err(e.classify()),
        }
    }

    /// Generate text with `model`. Fails fast with [`Error::CoolingDown`]
    /// while the model is cooling down after throttling.
    pub async fn generate(&self, model: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        self.cooldowns.check(model)?;

        let request = GenerateRequest::new(prompt, max_tokens);
        let request = &request;
        let result = self
            .resilience
            .execute(self.config.timeouts.generate, |route| async move {
                self.generate_content(&route, model, request).await
            })
            .await;

        match result {
            Ok(response) => Ok(response.text()),
            Err(e) => {
                let classified = e.classify();
                if classified.is_rate_limited() {
                    self.cooldowns.mark(model, classified.retry_after);
                }
                Err(e)
            }
        }
    }

    async fn fetch_catalog_page(
        &self,
        route: &Route,
        page_token: Option<&str>,
    ) -> Result<ListModelsResponse> {
        let mut url = self.api_url(route, "models")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &api::CATALOG_PAGE_SIZE.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let request = self.http.get(url);
        let body = self.send(request, "models.list", route).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn generate_content(
        &self,
        route: &Route,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse> {
        let url = self.api_url(route, &format!("models/{}:generateContent", model))?;
        let builder = self.http.post(url).json(request);
        let body = self.send(builder, "models.generateContent", route).await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn api_url(&self, route: &Route, path: &str) -> Result<url::Url> {
        let raw = format!("{}/{}/{}", route.base_url(), self.config.api_version, path);
        url::Url::parse(&raw).map_err(|e| Error::Config(format!("Invalid request URL {}: {}", raw, e)))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
        route: &Route,
    ) -> Result<String> {
        let span = self.spans.api_call_span(operation, route);

        let response = match request
            .header(API_KEY_HEADER, self.config.credential.expose())
            .send()
            .instrument(span.span().clone())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                span.finish(None);
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            span.finish(Some(status.as_u16()));
            return Err(api::error_from_response(
                status.as_u16(),
                retry_after.as_deref(),
                &body,
            ));
        }

        let body = response.text().await;
        span.finish(Some(status.as_u16()));
        Ok(body?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("resilience", &self.resilience)
            .finish_non_exhaustive()
    }
}

pub struct ClientBuilder {
    credential: Option<String>,
    transport: TransportMode,
    endpoints: Vec<String>,
    mirror_url: Option<String>,
    api_version: String,
    timeouts: Timeouts,
    retry: RetryConfig,
    health: HealthConfig,
    pool: PoolConfig,
    health_monitor: bool,
    cooldown: Option<Duration>,
    models: Option<Arc<ModelRegistry>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            credential: None,
            transport: TransportMode::Auto,
            endpoints: Vec::new(),
            mirror_url: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeouts: Timeouts::default(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            pool: PoolConfig::default(),
            health_monitor: true,
            cooldown: None,
            models: None,
            metrics: None,
        }
    }
}

impl ClientBuilder {
    pub fn credential(mut self, key: impl Into<String>) -> Self {
        self.credential = Some(key.into());
        self
    }

    pub fn transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    pub fn proxy(self, url: impl Into<String>) -> Self {
        self.transport(TransportMode::Proxy(url.into()))
    }

    /// Add an endpoint. The first one added is tried first.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoints.push(url.into());
        self
    }

    pub fn endpoints(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.endpoints.extend(urls.into_iter().map(Into::into));
        self
    }

    pub fn mirror(mut self, url: impl Into<String>) -> Self {
        self.mirror_url = Some(url.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn catalog_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.catalog = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.probe = timeout;
        self
    }

    pub fn generate_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.generate = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Whether to run the periodic endpoint health check. Default: on.
    pub fn health_monitor(mut self, enabled: bool) -> Self {
        self.health_monitor = enabled;
        self
    }

    /// Default cooldown after a throttled runtime call.
    pub fn cooldown(mut self, duration: Duration) -> Self {
        self.cooldown = Some(duration);
        self
    }

    pub fn model_registry(mut self, models: Arc<ModelRegistry>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Client> {
        let key = self
            .credential
            .ok_or_else(|| Error::auth("API key is required"))?;
        let credential = Credential::new(key)?;

        let endpoints = if self.endpoints.is_empty() {
            vec![DEFAULT_BASE_URL.to_string()]
        } else {
            self.endpoints
        };

        let config = ClientConfig {
            credential,
            transport: self.transport,
            endpoints,
            mirror_url: self.mirror_url,
            api_version: self.api_version,
            timeouts: self.timeouts,
            retry: self.retry,
            health: self.health,
            pool: self.pool,
        };
        config.validate()?;

        let http = network::build_http_client(&config.transport, &config.pool)?;
        let metrics = self.metrics.unwrap_or_default();

        let registry = Arc::new(EndpointRegistry::new(
            config.endpoints.iter().cloned(),
            config.health.clone(),
        ));
        if self.health_monitor && registry.len() > 1 {
            if tokio::runtime::Handle::try_current().is_ok() {
                registry.start_health_monitor();
            } else {
                tracing::debug!("no async runtime, endpoint health monitor not started");
            }
        }

        let resilience = Resilience::new(config.retry.clone(), registry)
            .with_mirror(config.effective_mirror().map(str::to_string))
            .with_metrics(Arc::clone(&metrics));
        let coalescer = RequestCoalescer::new().with_metrics(Arc::clone(&metrics));
        let cooldowns = match self.cooldown {
            Some(duration) => CooldownTracker::new(duration),
            None => CooldownTracker::default(),
        };
        let spans = SpanContext::new(config.credential.cache_key());

        tracing::debug!(
            endpoints = config.endpoints.len(),
            transport = config.transport.as_str(),
            mirror = config.effective_mirror().is_some(),
            "client built"
        );

        Ok(Client {
            config: Arc::new(config),
            http,
            resilience: Arc::new(resilience),
            coalescer: Arc::new(coalescer),
            cooldowns: Arc::new(cooldowns),
            models: self
                .models
                .unwrap_or_else(|| Arc::new(ModelRegistry::builtins())),
            metrics,
            spans: Arc::new(spans),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AIzaSyClientTest_0123456789";

    #[test]
    fn test_builder_requires_valid_credential() {
        assert!(matches!(
            Client::builder().build(),
            Err(Error::Auth { .. })
        ));
        assert!(matches!(
            Client::builder().credential("short").build(),
            Err(Error::Auth { .. })
        ));
    }

    #[test]
    fn test_builder_defaults() {
        let client = Client::builder().credential(KEY).build().unwrap();
        assert_eq!(client.config().endpoints, vec![DEFAULT_BASE_URL.to_string()]);
        assert_eq!(client.config().api_version, DEFAULT_API_VERSION);
        assert_eq!(client.config().retry.max_attempts, 3);
        assert_eq!(client.endpoints().current_endpoint().url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_builder_rejects_bad_endpoint() {
        let result = Client::builder()
            .credential(KEY)
            .endpoint("not a url")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = Client::builder().credential(KEY).max_attempts(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_direct_transport_drops_mirror() {
        let client = Client::builder()
            .credential(KEY)
            .transport(TransportMode::Direct)
            .mirror("https://mirror.example.com")
            .build()
            .unwrap();
        assert_eq!(client.config().effective_mirror(), None);
        assert_eq!(client.resilience().route_for(2).path, TransportPath::Direct);
    }

    #[tokio::test]
    async fn test_monitor_started_for_multiple_endpoints() {
        let client = Client::builder()
            .credential(KEY)
            .endpoints(["https://a.example.com", "https://b.example.com"])
            .build()
            .unwrap();
        assert!(client.endpoints().is_monitoring());
        client.dispose();
        assert!(!client.endpoints().is_monitoring());
    }

    #[tokio::test]
    async fn test_generate_respects_cooldown() {
        let client = Client::builder().credential(KEY).build().unwrap();
        client.cooldowns().mark("gemini-2.5-pro", None);
        let err = client
            .generate("models/gemini-2.5-pro", "hello", 16)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CoolingDown { ref model, .. } if model == "gemini-2.5-pro"));
    }
}
