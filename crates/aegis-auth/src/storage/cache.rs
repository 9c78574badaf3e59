//! Distributed cache trait and the get-or-add helper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::AuthError;

/// A string key/value cache with absolute expiration.
///
/// Used for polling throttle timestamps and other cross-instance
/// coordination state.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Gets the value for a key, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache operation fails.
    async fn get(&self, key: &str) -> AuthResult<Option<String>>;

    /// Sets a value with an absolute expiration from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache operation fails.
    async fn set(&self, key: &str, value: &str, expires_in: Duration) -> AuthResult<()>;

    /// Removes a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache operation fails.
    async fn remove(&self, key: &str) -> AuthResult<()>;
}

/// Get-or-add wrapper over a [`DistributedCache`].
///
/// Concurrent misses for the same key are serialized through a named lock,
/// and the cache is re-checked after the lock is acquired, so the factory
/// runs at most once per key per population. The lock wait is bounded by
/// `lock_timeout`; a timeout surfaces as an internal error rather than
/// computing the value twice silently.
pub struct CachedValue {
    cache: Arc<dyn DistributedCache>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    lock_timeout: Duration,
}

impl CachedValue {
    /// Creates a new helper with the given lock timeout.
    #[must_use]
    pub fn new(cache: Arc<dyn DistributedCache>, lock_timeout: Duration) -> Self {
        Self {
            cache,
            locks: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Gets the cached value for `key`, computing and storing it via
    /// `factory` on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache fails, the factory fails, or the
    /// named lock cannot be acquired within the configured timeout.
    pub async fn get_or_add<F, Fut>(
        &self,
        key: &str,
        expires_in: Duration,
        factory: F,
    ) -> AuthResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AuthResult<String>>,
    {
        if let Some(value) = self.cache.get(key).await? {
            return Ok(value);
        }

        let lock = self.named_lock(key);
        let guard = tokio::time::timeout(self.lock_timeout, lock.lock())
            .await
            .map_err(|_| {
                AuthError::internal(format!("Timed out waiting for cache lock on {key}"))
            })?;

        // Double-check: another task may have populated the key while we
        // were waiting on the lock.
        if let Some(value) = self.cache.get(key).await? {
            return Ok(value);
        }

        let value = factory().await?;
        self.cache.set(key, &value, expires_in).await?;
        drop(guard);

        Ok(value)
    }

    fn named_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;

    struct TestCache {
        entries: Mutex<HashMap<String, (String, OffsetDateTime)>>,
    }

    impl TestCache {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl DistributedCache for TestCache {
        async fn get(&self, key: &str) -> AuthResult<Option<String>> {
            let entries = self.entries.lock().unwrap();
            Ok(entries.get(key).and_then(|(value, expires)| {
                (OffsetDateTime::now_utc() < *expires).then(|| value.clone())
            }))
        }

        async fn set(&self, key: &str, value: &str, expires_in: Duration) -> AuthResult<()> {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                key.to_string(),
                (value.to_string(), OffsetDateTime::now_utc() + expires_in),
            );
            Ok(())
        }

        async fn remove(&self, key: &str) -> AuthResult<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_get_or_add_populates_on_miss() {
        let cache = Arc::new(TestCache::new());
        let cached = CachedValue::new(cache, Duration::from_secs(5));

        let value = cached
            .get_or_add("k", Duration::from_secs(60), || async {
                Ok("computed".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "computed");
    }

    #[tokio::test]
    async fn test_get_or_add_computes_once_per_key() {
        let cache = Arc::new(TestCache::new());
        let cached = Arc::new(CachedValue::new(cache, Duration::from_secs(5)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cached = cached.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cached
                    .get_or_add("k", Duration::from_secs(60), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok("v".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "v");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
