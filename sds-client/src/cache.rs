//! In-memory TTL cache with single-flight refresh.
//!
//! Used for the ROR organisation lookups and the Metax fields-of-science
//! list. Concurrent misses for the same key perform at most one upstream
//! fetch: the refresh lock serialises fillers and the second caller finds
//! the value the first one inserted.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use sds_core::AppError;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (V, Instant)>>,
    refresh: Mutex<()>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            refresh: Mutex::new(()),
        }
    }

    async fn fresh(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, stored)| stored.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    /// Return the cached value or fill it with `load`.
    ///
    /// Failures are not cached; the next caller retries the load.
    pub async fn get_or_load<F, Fut>(&self, key: K, load: F) -> Result<V, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, AppError>>,
    {
        if let Some(value) = self.fresh(&key).await {
            return Ok(value);
        }

        let _refresh = self.refresh.lock().await;
        // A concurrent filler may have resolved while we waited.
        if let Some(value) = self.fresh(&key).await {
            return Ok(value);
        }

        let value = load().await?;
        self.entries
            .write()
            .await
            .insert(key, (value.clone(), Instant::now()));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_misses_load_once() {
        let cache = Arc::new(TtlCache::<String, String>::new(Duration::from_secs(60)));
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("org".to_string(), || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok("Resolved".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "Resolved");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_loads_are_not_cached() {
        let cache = TtlCache::<&'static str, u32>::new(Duration::from_secs(60));
        let err = cache
            .get_or_load("k", || async { Err(AppError::UpstreamServer("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamServer(_)));
        let value = cache.get_or_load("k", || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::<&'static str, u32>::new(Duration::from_secs(10));
        cache.get_or_load("k", || async { Ok(1) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        let value = cache.get_or_load("k", || async { Ok(2) }).await.unwrap();
        assert_eq!(value, 2);
    }
}
