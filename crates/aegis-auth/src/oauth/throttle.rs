//! Polling throttle for device flow and CIBA.
//!
//! Last-seen timestamps live in the distributed cache, keyed by artifact
//! handle with a TTL equal to the artifact lifetime. A poll inside the
//! configured interval is throttled; the throttled poll re-writes the
//! entry so it cannot fall out of the cache mid-burst, but the window
//! stays anchored at the last accepted poll.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::debug;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::DistributedCache;

/// Throttles token-endpoint polling per grant artifact.
pub struct PollThrottle {
    cache: Arc<dyn DistributedCache>,
}

impl PollThrottle {
    /// Creates a new throttle over the given cache.
    #[must_use]
    pub fn new(cache: Arc<dyn DistributedCache>) -> Self {
        Self { cache }
    }

    /// Records a poll for `handle` and enforces the interval.
    ///
    /// # Arguments
    ///
    /// * `kind` - Namespace (`"device"` or `"ciba"`)
    /// * `handle` - The polled artifact handle
    /// * `interval` - Minimum time between accepted polls
    /// * `entry_lifetime` - Cache TTL; the artifact lifetime
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SlowDown` when the poll falls inside the
    /// interval since the last accepted poll, or a storage error if the
    /// cache fails.
    pub async fn check_poll(
        &self,
        kind: &str,
        handle: &str,
        interval: Duration,
        entry_lifetime: Duration,
    ) -> AuthResult<()> {
        let key = format!("poll:{kind}:{handle}");
        let now = OffsetDateTime::now_utc().unix_timestamp();

        if let Some(raw) = self.cache.get(&key).await? {
            let last_accepted: i64 = raw.parse().map_err(|_| {
                AuthError::internal(format!("Corrupt throttle entry for {key}"))
            })?;

            if now - last_accepted < interval.as_secs() as i64 {
                // Keep the entry alive so a bursting client cannot wait
                // out the cache TTL; the window stays anchored at the
                // last accepted poll.
                self.cache.set(&key, &raw, entry_lifetime).await?;
                debug!(kind, "Poll throttled");
                return Err(AuthError::SlowDown);
            }
        }

        self.cache.set(&key, &now.to_string(), entry_lifetime).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct TestCache {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl DistributedCache for TestCache {
        async fn get(&self, key: &str) -> AuthResult<Option<String>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str, _expires_in: Duration) -> AuthResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn remove(&self, key: &str) -> AuthResult<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn throttle() -> (PollThrottle, Arc<TestCache>) {
        let cache = Arc::new(TestCache {
            entries: Mutex::new(HashMap::new()),
        });
        (PollThrottle::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn test_first_poll_accepted() {
        let (throttle, _) = throttle();
        let result = throttle
            .check_poll(
                "device",
                "dc-1",
                Duration::from_secs(5),
                Duration::from_secs(300),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_poll_inside_interval_throttled() {
        let (throttle, _) = throttle();
        throttle
            .check_poll(
                "device",
                "dc-1",
                Duration::from_secs(5),
                Duration::from_secs(300),
            )
            .await
            .unwrap();

        let result = throttle
            .check_poll(
                "device",
                "dc-1",
                Duration::from_secs(5),
                Duration::from_secs(300),
            )
            .await;
        assert!(matches!(result, Err(AuthError::SlowDown)));
    }

    #[tokio::test]
    async fn test_throttled_poll_does_not_move_window() {
        let (throttle, cache) = throttle();
        let interval = Duration::from_secs(5);
        let lifetime = Duration::from_secs(300);

        // Accepted poll at t=0.
        throttle
            .check_poll("device", "dc-1", interval, lifetime)
            .await
            .unwrap();

        // Throttled poll "at t=2": rewind the stored stamp by 2 seconds to
        // simulate elapsed time, then poll.
        let key = "poll:device:dc-1";
        let stamp: i64 = cache.entries.lock().unwrap()[key].parse().unwrap();
        cache
            .entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (stamp - 2).to_string());
        let result = throttle
            .check_poll("device", "dc-1", interval, lifetime)
            .await;
        assert!(matches!(result, Err(AuthError::SlowDown)));

        // The window is still anchored at t=0: after 6 total seconds the
        // poll is accepted again even though a throttled poll happened at
        // t=2.
        let stamp: i64 = cache.entries.lock().unwrap()[key].parse().unwrap();
        cache
            .entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (stamp - 4).to_string());
        let result = throttle
            .check_poll("device", "dc-1", interval, lifetime)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_independent_handles() {
        let (throttle, _) = throttle();
        let interval = Duration::from_secs(5);
        let lifetime = Duration::from_secs(300);

        throttle
            .check_poll("device", "dc-1", interval, lifetime)
            .await
            .unwrap();
        // A different handle is not throttled by dc-1's window.
        assert!(
            throttle
                .check_poll("device", "dc-2", interval, lifetime)
                .await
                .is_ok()
        );
        // Nor is the same handle under a different namespace.
        assert!(
            throttle
                .check_poll("ciba", "dc-1", interval, lifetime)
                .await
                .is_ok()
        );
    }
}
