//! In-memory refresh and reference token stores.

use aegis_auth::AuthResult;
use aegis_auth::error::AuthError;
use aegis_auth::storage::{ReferenceTokenStore, RefreshTokenStore, StoredReferenceToken};
use aegis_auth::types::RefreshToken;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Refresh token store over a concurrent map keyed by handle hash.
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    by_hash: DashMap<String, RefreshToken>,
}

impl InMemoryRefreshTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn store(&self, token: &RefreshToken) -> AuthResult<()> {
        self.by_hash.insert(token.handle_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_by_handle_hash(&self, handle_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.by_hash.get(handle_hash).map(|entry| entry.clone()))
    }

    async fn update(&self, token: &RefreshToken) -> AuthResult<()> {
        let handle_hash = self
            .by_hash
            .iter()
            .find(|entry| entry.id == token.id)
            .map(|entry| entry.handle_hash.clone())
            .ok_or_else(|| AuthError::invalid_grant("Refresh token not found"))?;

        // The handle hash never changes on update; rotation stores a new
        // record instead.
        self.by_hash.remove(&handle_hash);
        self.by_hash.insert(token.handle_hash.clone(), token.clone());
        Ok(())
    }

    async fn remove_by_handle_hash(&self, handle_hash: &str) -> AuthResult<()> {
        self.by_hash.remove(handle_hash);
        Ok(())
    }

    async fn remove_by_id(&self, id: Uuid) -> AuthResult<()> {
        self.by_hash.retain(|_, token| token.id != id);
        Ok(())
    }

    async fn remove_by_session(
        &self,
        subject_id: &str,
        session_id: &str,
        client_ids: &[String],
    ) -> AuthResult<u64> {
        let before = self.by_hash.len();
        self.by_hash.retain(|_, token| {
            !(token.subject_id == subject_id
                && token.session_id.as_deref() == Some(session_id)
                && client_ids.contains(&token.client_id))
        });
        Ok((before - self.by_hash.len()) as u64)
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let before = self.by_hash.len();
        self.by_hash.retain(|_, token| !token.is_expired());
        Ok((before - self.by_hash.len()) as u64)
    }
}

/// Reference token store over a concurrent map keyed by handle.
#[derive(Default)]
pub struct InMemoryReferenceTokenStore {
    tokens: DashMap<String, StoredReferenceToken>,
}

impl InMemoryReferenceTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReferenceTokenStore for InMemoryReferenceTokenStore {
    async fn store(&self, handle: &str, token: &StoredReferenceToken) -> AuthResult<()> {
        self.tokens.insert(handle.to_string(), token.clone());
        Ok(())
    }

    async fn find(&self, handle: &str) -> AuthResult<Option<StoredReferenceToken>> {
        Ok(self.tokens.get(handle).map(|entry| entry.clone()))
    }

    async fn remove(&self, handle: &str) -> AuthResult<()> {
        self.tokens.remove(handle);
        Ok(())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !token.is_expired());
        Ok((before - self.tokens.len()) as u64)
    }
}
