//! Refresh token validation, creation, and rotation.
//!
//! Two orthogonal concerns meet in [`RefreshTokenService::update_refresh_token`]:
//! one-time-use rotation (delete-and-reissue or mark-consumed-and-reissue)
//! and sliding-expiration extension (capped at the absolute lifetime).
//! Both may apply to a single renewal.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::token_request::ValidatedTokenRequest;
use crate::storage::RefreshTokenStore;
use crate::types::{Client, RefreshToken, RefreshTokenExpiration, RefreshTokenUsage};

/// Decides whether a consumed refresh token may still be accepted.
///
/// One-time-use rotation marks the presented handle consumed; a later
/// presentation of that handle reaches this policy. The shipped default
/// rejects, but the hook exists so a grace window (accepting tokens
/// consumed moments ago, for unreliable networks) can be slotted in.
#[async_trait]
pub trait ConsumedTokenPolicy: Send + Sync {
    /// Returns `true` to accept the consumed token anyway.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy cannot be evaluated.
    async fn accept_consumed(&self, token: &RefreshToken) -> AuthResult<bool>;
}

/// The default policy: consumed tokens are never accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectConsumedTokens;

#[async_trait]
impl ConsumedTokenPolicy for RejectConsumedTokens {
    async fn accept_consumed(&self, _token: &RefreshToken) -> AuthResult<bool> {
        Ok(false)
    }
}

/// How one-time-use rotation disposes of the presented handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    /// Mark the presented record consumed and issue a fresh one.
    /// Keeps an audit trail and feeds the consumed-token policy.
    #[default]
    MarkConsumed,
    /// Delete the presented record outright and issue a fresh one.
    Delete,
}

/// Refresh token lifecycle service.
pub struct RefreshTokenService {
    store: Arc<dyn RefreshTokenStore>,
    consumed_policy: Arc<dyn ConsumedTokenPolicy>,
    rotation_mode: RotationMode,
}

impl RefreshTokenService {
    /// Creates a service with the default reject-consumed policy.
    #[must_use]
    pub fn new(store: Arc<dyn RefreshTokenStore>) -> Self {
        Self {
            store,
            consumed_policy: Arc::new(RejectConsumedTokens),
            rotation_mode: RotationMode::default(),
        }
    }

    /// Replaces the consumed-token policy.
    #[must_use]
    pub fn with_consumed_policy(mut self, policy: Arc<dyn ConsumedTokenPolicy>) -> Self {
        self.consumed_policy = policy;
        self
    }

    /// Sets the rotation mode.
    #[must_use]
    pub fn with_rotation_mode(mut self, mode: RotationMode) -> Self {
        self.rotation_mode = mode;
        self
    }

    /// Validates a presented refresh token handle.
    ///
    /// Checks, in order: the token exists, is not expired, is bound to the
    /// authenticating client, the client still permits `offline_access`,
    /// and — if previously consumed — the consumed-token policy accepts it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` on any check failure.
    pub async fn validate_refresh_token(
        &self,
        handle: &str,
        client: &Client,
    ) -> AuthResult<RefreshToken> {
        let handle_hash = RefreshToken::hash_handle(handle);
        let token = self
            .store
            .find_by_handle_hash(&handle_hash)
            .await?
            .ok_or_else(|| {
                debug!(client_id = %client.client_id, "Unknown refresh token handle");
                AuthError::invalid_grant("Invalid refresh token")
            })?;

        if token.is_expired() {
            debug!(client_id = %client.client_id, "Refresh token expired");
            return Err(AuthError::invalid_grant("Refresh token has expired"));
        }

        if token.client_id != client.client_id {
            debug!(
                client_id = %client.client_id,
                issued_to = %token.client_id,
                "Refresh token client binding mismatch"
            );
            return Err(AuthError::invalid_grant(
                "Refresh token was issued to a different client",
            ));
        }

        if !client.allow_offline_access {
            return Err(AuthError::invalid_grant(
                "Client no longer allows offline access",
            ));
        }

        if token.is_consumed() && !self.consumed_policy.accept_consumed(&token).await? {
            debug!(client_id = %client.client_id, "Consumed refresh token replayed");
            return Err(AuthError::invalid_grant("Refresh token was already used"));
        }

        Ok(token)
    }

    /// Creates a refresh token for a validated request.
    ///
    /// The initial lifetime is the absolute lifetime for `Absolute`
    /// expiration, or the sliding window — capped at the absolute maximum
    /// when one is set — for `Sliding`.
    ///
    /// # Returns
    ///
    /// The plaintext handle to return to the client. Only its hash is
    /// stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the request carries no subject or the store
    /// fails.
    pub async fn create_refresh_token(
        &self,
        request: &ValidatedTokenRequest,
    ) -> AuthResult<String> {
        let subject_id = request.subject_id.clone().ok_or_else(|| {
            AuthError::internal("Refresh token requested without a subject")
        })?;
        let client = &request.client;

        let lifetime_secs = initial_lifetime(client);
        let handle = RefreshToken::generate_handle();

        let token = RefreshToken {
            id: Uuid::new_v4(),
            handle_hash: RefreshToken::hash_handle(&handle),
            client_id: client.client_id.clone(),
            subject_id,
            session_id: request.session_id.clone(),
            authorized_scopes: request.resources.scope_names(),
            authorized_resource_indicators: request.resources.api_resource_names(),
            proof_type: request.proof_type,
            proof_key_thumbprint: request
                .confirmation
                .as_ref()
                .and_then(|cnf| cnf.jkt.clone().or_else(|| cnf.x5t_s256.clone())),
            created_at: OffsetDateTime::now_utc(),
            lifetime_secs,
            consumed_at: None,
        };

        self.store.store(&token).await?;
        Ok(handle)
    }

    /// Updates a refresh token on renewal.
    ///
    /// Applies one-time-use rotation and sliding extension independently;
    /// either, both, or neither may fire for a given client configuration.
    ///
    /// # Returns
    ///
    /// The handle the client must use from now on: a fresh one under
    /// one-time-use rotation, otherwise the presented one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn update_refresh_token(
        &self,
        presented_handle: &str,
        token: &RefreshToken,
        client: &Client,
    ) -> AuthResult<String> {
        let mut record = token.clone();
        let mut handle = presented_handle.to_string();
        let rotated = client.refresh_token_usage == RefreshTokenUsage::OneTimeOnly;

        // Sliding extension, anchored at the original creation time and
        // capped at the absolute lifetime.
        if client.refresh_token_expiration == RefreshTokenExpiration::Sliding {
            let age_secs =
                (OffsetDateTime::now_utc() - record.created_at).whole_seconds().max(0) as u64;
            let mut extended = age_secs + client.sliding_refresh_token_lifetime;
            if client.absolute_refresh_token_lifetime > 0 {
                extended = extended.min(client.absolute_refresh_token_lifetime);
            }
            record.lifetime_secs = extended;
        }

        if rotated {
            handle = RefreshToken::generate_handle();

            match self.rotation_mode {
                RotationMode::Delete => {
                    self.store
                        .remove_by_handle_hash(&RefreshToken::hash_handle(presented_handle))
                        .await?;
                    record.id = Uuid::new_v4();
                    record.handle_hash = RefreshToken::hash_handle(&handle);
                    record.consumed_at = None;
                    self.store.store(&record).await?;
                }
                RotationMode::MarkConsumed => {
                    let mut consumed = token.clone();
                    consumed.consumed_at = Some(OffsetDateTime::now_utc());
                    self.store.update(&consumed).await?;

                    record.id = Uuid::new_v4();
                    record.handle_hash = RefreshToken::hash_handle(&handle);
                    record.consumed_at = None;
                    self.store.store(&record).await?;
                }
            }
        } else if record.lifetime_secs != token.lifetime_secs {
            // Re-use mode with sliding extension only.
            self.store.update(&record).await?;
        }

        Ok(handle)
    }
}

/// Initial lifetime for a new refresh token per client configuration.
fn initial_lifetime(client: &Client) -> u64 {
    match client.refresh_token_expiration {
        RefreshTokenExpiration::Absolute => client.absolute_refresh_token_lifetime,
        RefreshTokenExpiration::Sliding => {
            if client.absolute_refresh_token_lifetime > 0 {
                client
                    .sliding_refresh_token_lifetime
                    .min(client.absolute_refresh_token_lifetime)
            } else {
                client.sliding_refresh_token_lifetime
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessTokenType, GrantType, Resources};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct TestRefreshTokenStore {
        by_hash: Mutex<HashMap<String, RefreshToken>>,
    }

    impl TestRefreshTokenStore {
        fn new() -> Self {
            Self {
                by_hash: Mutex::new(HashMap::new()),
            }
        }

        fn count(&self) -> usize {
            self.by_hash.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RefreshTokenStore for TestRefreshTokenStore {
        async fn store(&self, token: &RefreshToken) -> AuthResult<()> {
            self.by_hash
                .lock()
                .unwrap()
                .insert(token.handle_hash.clone(), token.clone());
            Ok(())
        }

        async fn find_by_handle_hash(&self, handle_hash: &str) -> AuthResult<Option<RefreshToken>> {
            Ok(self.by_hash.lock().unwrap().get(handle_hash).cloned())
        }

        async fn update(&self, token: &RefreshToken) -> AuthResult<()> {
            let mut by_hash = self.by_hash.lock().unwrap();
            let existing = by_hash
                .values_mut()
                .find(|candidate| candidate.id == token.id)
                .ok_or_else(|| AuthError::invalid_grant("Token not found"))?;
            *existing = token.clone();
            Ok(())
        }

        async fn remove_by_handle_hash(&self, handle_hash: &str) -> AuthResult<()> {
            self.by_hash.lock().unwrap().remove(handle_hash);
            Ok(())
        }

        async fn remove_by_id(&self, id: Uuid) -> AuthResult<()> {
            self.by_hash.lock().unwrap().retain(|_, t| t.id != id);
            Ok(())
        }

        async fn remove_by_session(
            &self,
            subject_id: &str,
            session_id: &str,
            client_ids: &[String],
        ) -> AuthResult<u64> {
            let mut by_hash = self.by_hash.lock().unwrap();
            let before = by_hash.len();
            by_hash.retain(|_, t| {
                !(t.subject_id == subject_id
                    && t.session_id.as_deref() == Some(session_id)
                    && client_ids.contains(&t.client_id))
            });
            Ok((before - by_hash.len()) as u64)
        }

        async fn cleanup_expired(&self) -> AuthResult<u64> {
            let mut by_hash = self.by_hash.lock().unwrap();
            let before = by_hash.len();
            by_hash.retain(|_, t| !t.is_expired());
            Ok((before - by_hash.len()) as u64)
        }
    }

    fn test_client() -> Client {
        Client {
            client_id: "app".to_string(),
            protocol_type: "oidc".to_string(),
            secrets: vec![],
            name: "Test App".to_string(),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            allowed_scopes: vec!["openid".to_string()],
            allow_offline_access: true,
            active: true,
            access_token_lifetime: None,
            access_token_type: AccessTokenType::Jwt,
            refresh_token_usage: RefreshTokenUsage::OneTimeOnly,
            refresh_token_expiration: crate::types::RefreshTokenExpiration::Absolute,
            absolute_refresh_token_lifetime: 2_592_000,
            sliding_refresh_token_lifetime: 1_296_000,
            require_dpop: false,
            coordinate_lifetime_with_user_session: None,
            allowed_signing_algorithms: vec![],
            jwks: None,
            back_channel_logout_uri: None,
        }
    }

    fn validated_request(client: Client) -> ValidatedTokenRequest {
        let mut request = ValidatedTokenRequest::new(client, GrantType::AuthorizationCode);
        request.subject_id = Some("alice".to_string());
        request.session_id = Some("sess-1".to_string());
        request.resources = Resources {
            offline_access: true,
            ..Resources::default()
        };
        request
    }

    fn service(store: Arc<TestRefreshTokenStore>) -> RefreshTokenService {
        RefreshTokenService::new(store)
    }

    #[tokio::test]
    async fn test_create_and_validate() {
        let store = Arc::new(TestRefreshTokenStore::new());
        let service = service(store.clone());
        let client = test_client();

        let handle = service
            .create_refresh_token(&validated_request(client.clone()))
            .await
            .unwrap();

        let token = service.validate_refresh_token(&handle, &client).await.unwrap();
        assert_eq!(token.subject_id, "alice");
        assert_eq!(token.lifetime_secs, 2_592_000);
    }

    #[tokio::test]
    async fn test_unknown_handle_rejected() {
        let service = service(Arc::new(TestRefreshTokenStore::new()));
        let result = service
            .validate_refresh_token("no-such-handle", &test_client())
            .await;
        assert!(matches!(result, Err(AuthError::InvalidGrant { .. })));
    }

    #[tokio::test]
    async fn test_client_binding_enforced() {
        let store = Arc::new(TestRefreshTokenStore::new());
        let service = service(store);
        let client = test_client();
        let handle = service
            .create_refresh_token(&validated_request(client.clone()))
            .await
            .unwrap();

        let mut other = test_client();
        other.client_id = "other".to_string();
        let result = service.validate_refresh_token(&handle, &other).await;
        assert!(matches!(result, Err(AuthError::InvalidGrant { .. })));
    }

    #[tokio::test]
    async fn test_offline_access_revoked_rejected() {
        let store = Arc::new(TestRefreshTokenStore::new());
        let service = service(store);
        let client = test_client();
        let handle = service
            .create_refresh_token(&validated_request(client.clone()))
            .await
            .unwrap();

        let mut revoked = client.clone();
        revoked.allow_offline_access = false;
        let result = service.validate_refresh_token(&handle, &revoked).await;
        assert!(matches!(result, Err(AuthError::InvalidGrant { .. })));
    }

    #[tokio::test]
    async fn test_one_time_use_second_redemption_fails() {
        let store = Arc::new(TestRefreshTokenStore::new());
        let service = service(store);
        let client = test_client();
        let handle = service
            .create_refresh_token(&validated_request(client.clone()))
            .await
            .unwrap();

        let token = service.validate_refresh_token(&handle, &client).await.unwrap();
        let new_handle = service
            .update_refresh_token(&handle, &token, &client)
            .await
            .unwrap();
        assert_ne!(new_handle, handle);

        // The presented handle is consumed; a replay fails.
        let result = service.validate_refresh_token(&handle, &client).await;
        assert!(matches!(result, Err(AuthError::InvalidGrant { .. })));

        // The fresh handle works.
        assert!(service.validate_refresh_token(&new_handle, &client).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_rotation_leaves_single_record() {
        let store = Arc::new(TestRefreshTokenStore::new());
        let service =
            RefreshTokenService::new(store.clone()).with_rotation_mode(RotationMode::Delete);
        let client = test_client();
        let handle = service
            .create_refresh_token(&validated_request(client.clone()))
            .await
            .unwrap();

        let token = service.validate_refresh_token(&handle, &client).await.unwrap();
        let new_handle = service
            .update_refresh_token(&handle, &token, &client)
            .await
            .unwrap();

        assert_eq!(store.count(), 1);
        assert!(service.validate_refresh_token(&handle, &client).await.is_err());
        assert!(service.validate_refresh_token(&new_handle, &client).await.is_ok());
    }

    #[tokio::test]
    async fn test_reuse_mode_keeps_handle() {
        let store = Arc::new(TestRefreshTokenStore::new());
        let service = service(store);
        let mut client = test_client();
        client.refresh_token_usage = RefreshTokenUsage::ReUse;

        let handle = service
            .create_refresh_token(&validated_request(client.clone()))
            .await
            .unwrap();
        let token = service.validate_refresh_token(&handle, &client).await.unwrap();
        let same = service
            .update_refresh_token(&handle, &token, &client)
            .await
            .unwrap();

        assert_eq!(same, handle);
        assert!(service.validate_refresh_token(&handle, &client).await.is_ok());
    }

    #[tokio::test]
    async fn test_sliding_extension_capped_at_absolute() {
        let store = Arc::new(TestRefreshTokenStore::new());
        let service = service(store.clone());
        let mut client = test_client();
        client.refresh_token_usage = RefreshTokenUsage::ReUse;
        client.refresh_token_expiration = crate::types::RefreshTokenExpiration::Sliding;
        client.sliding_refresh_token_lifetime = 1000;
        client.absolute_refresh_token_lifetime = 1500;

        let handle = service
            .create_refresh_token(&validated_request(client.clone()))
            .await
            .unwrap();
        let mut token = service.validate_refresh_token(&handle, &client).await.unwrap();
        assert_eq!(token.lifetime_secs, 1000);

        // Pretend 800 seconds have elapsed: extension would reach 1800,
        // but the absolute cap holds it at 1500.
        token.created_at = OffsetDateTime::now_utc() - time::Duration::seconds(800);
        store.update(&token).await.unwrap();
        service
            .update_refresh_token(&handle, &token, &client)
            .await
            .unwrap();

        let updated = service.validate_refresh_token(&handle, &client).await.unwrap();
        assert_eq!(updated.lifetime_secs, 1500);
    }

    #[tokio::test]
    async fn test_consumed_policy_can_accept() {
        struct AcceptAll;

        #[async_trait]
        impl ConsumedTokenPolicy for AcceptAll {
            async fn accept_consumed(&self, _token: &RefreshToken) -> AuthResult<bool> {
                Ok(true)
            }
        }

        let store = Arc::new(TestRefreshTokenStore::new());
        let service =
            RefreshTokenService::new(store.clone()).with_consumed_policy(Arc::new(AcceptAll));
        let client = test_client();
        let handle = service
            .create_refresh_token(&validated_request(client.clone()))
            .await
            .unwrap();

        let token = service.validate_refresh_token(&handle, &client).await.unwrap();
        service
            .update_refresh_token(&handle, &token, &client)
            .await
            .unwrap();

        // Consumed, but the grace policy accepts it.
        assert!(service.validate_refresh_token(&handle, &client).await.is_ok());
    }
}
