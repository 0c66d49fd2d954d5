//! Merges identical in-flight requests into one shared call.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::observability::MetricsRegistry;

const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);
const PAYLOAD_FINGERPRINT_CHARS: usize = 512;
const CREDENTIAL_FINGERPRINT_CHARS: usize = 8;

struct PendingRequest<T: Clone> {
    id: u64,
    handle: Shared<BoxFuture<'static, T>>,
    created_at: Instant,
}

type PendingTable<T> = Arc<Mutex<HashMap<u64, PendingRequest<T>>>>;

/// Table of in-flight calls keyed by request fingerprint.
///
/// The first caller for a key starts the call; later callers with the same
/// key await the same shared outcome. The entry is removed when the call
/// completes, successfully or not. Entries older than `stale_after` are
/// dropped lazily on the next call so a caller that abandoned its future
/// cannot block a key forever.
pub struct RequestCoalescer<T: Clone> {
    pending: PendingTable<T>,
    next_id: AtomicU64,
    stale_after: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<T> RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_stale_after(DEFAULT_STALE_AFTER)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            stale_after,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingRequest<T>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    pub async fn coalesce<F, Fut>(&self, key: u64, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let handle = {
            let mut pending = self.lock();
            let stale_after = self.stale_after;
            pending.retain(|_, entry| entry.created_at.elapsed() < stale_after);

            if let Some(entry) = pending.get(&key) {
                tracing::debug!(key, "joining in-flight request");
                if let Some(ref metrics) = self.metrics {
                    metrics.record_coalesced();
                }
                entry.handle.clone()
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let table = Arc::clone(&self.pending);
                let call = make();
                let handle = async move {
                    let output = call.await;
                    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
                    if table.get(&key).is_some_and(|entry| entry.id == id) {
                        table.remove(&key);
                    }
                    output
                }
                .boxed()
                .shared();

                pending.insert(
                    key,
                    PendingRequest {
                        id,
                        handle: handle.clone(),
                        created_at: Instant::now(),
                    },
                );
                handle
            }
        };

        handle.await
    }
}

impl<T> Default for RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic key for a request: target, normalized payload prefix and a
/// short credential prefix. No timestamps, so identical requests collide.
pub fn fingerprint(target: &str, payload: &str, credential: &str) -> u64 {
    let normalized: String = payload
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(PAYLOAD_FINGERPRINT_CHARS)
        .collect();
    let credential_prefix: String = credential
        .chars()
        .take(CREDENTIAL_FINGERPRINT_CHARS)
        .collect();

    let mut hasher = DefaultHasher::new();
    target.hash(&mut hasher);
    normalized.hash(&mut hasher);
    credential_prefix.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("models/gemini-2.5-flash", "{\"a\": 1}", "AIzaSyA123456789");
        let b = fingerprint("models/gemini-2.5-flash", "{\"a\":  1}\n", "AIzaSyA1zzzzzzzz");
        assert_eq!(a, b);

        let other_target = fingerprint("models/gemini-2.5-pro", "{\"a\": 1}", "AIzaSyA123456789");
        assert_ne!(a, other_target);

        let other_key = fingerprint("models/gemini-2.5-flash", "{\"a\": 1}", "BIzaSyA123456789");
        assert_ne!(a, other_key);
    }

    #[test]
    fn test_fingerprint_truncates_payload() {
        let base = "x".repeat(600);
        let a = fingerprint("t", &base, "k");
        let b = fingerprint("t", &format!("{base}tail"), "k");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_concurrent_identical_calls_share_one_execution() {
        let coalescer = RequestCoalescer::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let make = || {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                42
            }
        };

        let (a, b) = tokio::join!(coalescer.coalesce(1, make()), coalescer.coalesce(1, make()));

        assert_eq!((a, b), (42, 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_separately() {
        let coalescer = RequestCoalescer::<u32>::new();
        let (a, b) = tokio::join!(
            coalescer.coalesce(1, || async { 1 }),
            coalescer.coalesce(2, || async { 2 })
        );
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn test_failed_call_is_removed_and_retried_fresh() {
        let coalescer = RequestCoalescer::<Result<u32, String>>::new();

        let first = coalescer
            .coalesce(9, || async { Err::<u32, _>("boom".to_string()) })
            .await;
        assert!(first.is_err());
        assert_eq!(coalescer.in_flight(), 0);

        let second = coalescer.coalesce(9, || async { Ok(5) }).await;
        assert_eq!(second, Ok(5));
    }

    #[tokio::test]
    async fn test_stale_entry_is_replaced() {
        let coalescer = RequestCoalescer::<u32>::with_stale_after(Duration::from_millis(10));

        // Start a call and abandon it so its entry lingers.
        let abandoned = coalescer.coalesce(3, || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            0
        });
        let _ = tokio::time::timeout(Duration::from_millis(1), abandoned).await;
        assert_eq!(coalescer.in_flight(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let value = coalescer.coalesce(3, || async { 7 }).await;
        assert_eq!(value, 7);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_join_is_counted() {
        let metrics = Arc::new(MetricsRegistry::default());
        let coalescer = RequestCoalescer::<u32>::new().with_metrics(metrics.clone());
        let slow = || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            1
        };
        let _ = tokio::join!(coalescer.coalesce(4, slow), coalescer.coalesce(4, slow));
        assert_eq!(metrics.coalesced_joins.get(), 1);
    }
}
