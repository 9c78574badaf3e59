//! In-memory replay cache and distributed cache.

use std::time::Duration;

use aegis_auth::AuthResult;
use aegis_auth::storage::{DistributedCache, ReplayCache};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

/// Replay cache over a concurrent map.
///
/// The check-then-insert is a single `entry` operation on the shard, so
/// two concurrent presentations of the same handle serialize on the map
/// and exactly one wins.
#[derive(Default)]
pub struct InMemoryReplayCache {
    entries: DashMap<(String, String), OffsetDateTime>,
}

impl InMemoryReplayCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayCache for InMemoryReplayCache {
    async fn add_if_not_exists(
        &self,
        purpose: &str,
        handle: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<bool> {
        let key = (purpose.to_string(), handle.to_string());
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                // A dead entry no longer blocks the handle.
                if *occupied.get() < OffsetDateTime::now_utc() {
                    occupied.insert(expires_at);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at >= now);
        Ok((before - self.entries.len()) as u64)
    }
}

/// Distributed cache stand-in over a concurrent map.
#[derive(Default)]
pub struct InMemoryDistributedCache {
    entries: DashMap<String, (String, OffsetDateTime)>,
}

impl InMemoryDistributedCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedCache for InMemoryDistributedCache {
    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.entries.get(key).and_then(|entry| {
            let (value, expires_at) = entry.value();
            (OffsetDateTime::now_utc() < *expires_at).then(|| value.clone())
        }))
    }

    async fn set(&self, key: &str, value: &str, expires_in: Duration) -> AuthResult<()> {
        self.entries.insert(
            key.to_string(),
            (
                value.to_string(),
                OffsetDateTime::now_utc() + expires_in,
            ),
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_cache_first_use_wins() {
        let cache = InMemoryReplayCache::new();
        let expires = OffsetDateTime::now_utc() + time::Duration::minutes(5);

        assert!(cache.add_if_not_exists("p", "jti-1", expires).await.unwrap());
        assert!(!cache.add_if_not_exists("p", "jti-1", expires).await.unwrap());
        // Same handle under another purpose is independent.
        assert!(cache.add_if_not_exists("q", "jti-1", expires).await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_cache_concurrent_single_winner() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = Arc::new(InMemoryReplayCache::new());
        let wins = Arc::new(AtomicUsize::new(0));
        let expires = OffsetDateTime::now_utc() + time::Duration::minutes(5);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let wins = wins.clone();
            handles.push(tokio::spawn(async move {
                if cache.add_if_not_exists("p", "contested", expires).await.unwrap() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replay_cache_expired_entry_reusable() {
        let cache = InMemoryReplayCache::new();
        let past = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        let future = OffsetDateTime::now_utc() + time::Duration::minutes(5);

        assert!(cache.add_if_not_exists("p", "jti-2", past).await.unwrap());
        // The old entry is expired, so the handle is usable again.
        assert!(cache.add_if_not_exists("p", "jti-2", future).await.unwrap());
        assert!(!cache.add_if_not_exists("p", "jti-2", future).await.unwrap());
    }

    #[tokio::test]
    async fn test_distributed_cache_expiry() {
        let cache = InMemoryDistributedCache::new();

        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.set("dead", "v", Duration::from_secs(0)).await.unwrap();
        assert_eq!(cache.get("dead").await.unwrap(), None);

        cache.remove("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
