//! Server-side sessions and session coordination.
//!
//! A [`ServerSideSession`] represents one authenticated browser session.
//! For clients that coordinate token lifetimes with the user session,
//! refresh/access token validity is gated on the matching session still
//! existing and being unexpired — the binding invariant between
//! interactive sessions and long-lived tokens.
//!
//! The [`SessionCoordinationService`] owns that invariant: it validates
//! session liveness during token operations, extends sliding expiration on
//! successful use, and fans out persisted-grant revocation plus
//! back-channel logout notifications when a session ends.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::AuthResult;
use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::storage::{ClientStore, RefreshTokenStore, ServerSideSessionStore};
use crate::types::Client;

// =============================================================================
// Server-side session
// =============================================================================

/// One authenticated browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSideSession {
    /// Authenticated subject.
    pub subject_id: String,

    /// Session identifier (the `sid` claim).
    pub session_id: String,

    /// Issuer the session belongs to.
    pub issuer: String,

    /// Clients that participated in this session.
    #[serde(default)]
    pub client_ids: Vec<String>,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the session was last renewed.
    #[serde(with = "time::serde::rfc3339")]
    pub renewed_at: OffsetDateTime,

    /// When the session expires. `None` means no server-side expiry.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expires_at: Option<OffsetDateTime>,
}

impl ServerSideSession {
    /// Returns `true` if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| OffsetDateTime::now_utc() > exp)
            .unwrap_or(false)
    }

    /// Extends the sliding expiration.
    ///
    /// The new expiry is `now` plus the delta between the current expiry
    /// and the last renewal — the originally configured sliding window
    /// length — rather than a flat reset.
    pub fn extend_sliding_expiration(&mut self, now: OffsetDateTime) {
        if let Some(expires) = self.expires_at {
            let window = expires - self.renewed_at;
            self.expires_at = Some(now + window);
        }
        self.renewed_at = now;
    }

    /// Records a client as a participant in this session.
    pub fn add_client(&mut self, client_id: &str) {
        if !self.client_ids.iter().any(|id| id == client_id) {
            self.client_ids.push(client_id.to_string());
        }
    }
}

// =============================================================================
// Back-channel logout
// =============================================================================

/// A back-channel logout notification ready for delivery.
///
/// The logout token claims follow OIDC Back-Channel Logout 1.0; actual
/// HTTP delivery is the notifier implementation's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackChannelLogoutRequest {
    /// Client to notify.
    pub client_id: String,

    /// The client's registered back-channel logout endpoint.
    pub logout_uri: String,

    /// Logout token claims (`iss`, `sub`, `sid`, `aud`, `events`, ...).
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Delivers back-channel logout notifications to clients.
#[async_trait]
pub trait BackChannelLogoutNotifier: Send + Sync {
    /// Sends one logout notification. Delivery failures are the
    /// implementation's to log/retry; they do not fail the logout.
    async fn send(&self, request: &BackChannelLogoutRequest) -> AuthResult<()>;
}

// =============================================================================
// Session coordination service
// =============================================================================

/// Coordinates token validity with server-side session liveness.
pub struct SessionCoordinationService {
    session_store: Arc<dyn ServerSideSessionStore>,
    refresh_token_store: Arc<dyn RefreshTokenStore>,
    client_store: Arc<dyn ClientStore>,
    logout_notifier: Arc<dyn BackChannelLogoutNotifier>,
    issuer: String,
    config: SessionConfig,
}

impl SessionCoordinationService {
    /// Creates a new session coordination service.
    #[must_use]
    pub fn new(
        session_store: Arc<dyn ServerSideSessionStore>,
        refresh_token_store: Arc<dyn RefreshTokenStore>,
        client_store: Arc<dyn ClientStore>,
        logout_notifier: Arc<dyn BackChannelLogoutNotifier>,
        issuer: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        Self {
            session_store,
            refresh_token_store,
            client_store,
            logout_notifier,
            issuer: issuer.into(),
            config,
        }
    }

    /// Validates that the session backing a token is still alive.
    ///
    /// For clients not configured to coordinate lifetimes this is a no-op.
    /// For coordinated clients, a missing or expired session invalidates
    /// the token; a live session has its sliding expiration extended.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the session is gone or expired.
    pub async fn validate_session(
        &self,
        client: &Client,
        subject_id: &str,
        session_id: Option<&str>,
    ) -> AuthResult<()> {
        if !client.coordinates_with_session(self.config.coordinate_client_lifetimes) {
            return Ok(());
        }

        let Some(session_id) = session_id else {
            debug!(
                client_id = %client.client_id,
                "Coordinated client token carries no session id"
            );
            return Err(AuthError::invalid_grant("No session id bound to token"));
        };

        let mut session = self
            .session_store
            .find_by_subject_and_session(subject_id, session_id)
            .await?
            .ok_or_else(|| {
                debug!(session_id, "Server-side session no longer exists");
                AuthError::invalid_grant("Session no longer valid")
            })?;

        if session.is_expired() {
            debug!(session_id, "Server-side session expired");
            return Err(AuthError::invalid_grant("Session expired"));
        }

        session.extend_sliding_expiration(OffsetDateTime::now_utc());
        self.session_store.update(&session).await?;

        Ok(())
    }

    /// Processes an interactive logout.
    ///
    /// Revokes persisted grants for the clients configured for session
    /// coordination, then sends back-channel logout notifications to the
    /// full original client list (backward compatibility), and finally
    /// deletes the session.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails. Notification delivery
    /// failures are logged and swallowed.
    pub async fn process_logout(&self, subject_id: &str, session_id: &str) -> AuthResult<()> {
        let Some(session) = self
            .session_store
            .find_by_subject_and_session(subject_id, session_id)
            .await?
        else {
            return Ok(());
        };

        let coordinated = self.coordinated_clients(&session.client_ids).await?;
        self.revoke_session_grants(&session, &coordinated).await?;

        // Logout always notifies every participating client, coordinated
        // or not.
        self.notify_clients(&session, &session.client_ids).await;

        self.session_store.delete(subject_id, session_id).await
    }

    /// Processes expired sessions in batches.
    ///
    /// For each removed session, revokes persisted grants and notifies
    /// exactly the clients configured for coordination.
    ///
    /// # Returns
    ///
    /// The number of sessions processed.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub async fn process_expiration(&self, batch_size: usize) -> AuthResult<usize> {
        let expired = self.session_store.take_expired(batch_size).await?;
        let count = expired.len();

        for session in expired {
            let coordinated = self.coordinated_clients(&session.client_ids).await?;
            self.revoke_session_grants(&session, &coordinated).await?;
            self.notify_clients(&session, &coordinated).await;
        }

        Ok(count)
    }

    /// Filters the given client ids down to those configured for
    /// session coordination.
    async fn coordinated_clients(&self, client_ids: &[String]) -> AuthResult<Vec<String>> {
        let mut coordinated = Vec::new();
        for client_id in client_ids {
            if let Some(client) = self.client_store.find_by_client_id(client_id).await?
                && client.coordinates_with_session(self.config.coordinate_client_lifetimes)
            {
                coordinated.push(client_id.clone());
            }
        }
        Ok(coordinated)
    }

    async fn revoke_session_grants(
        &self,
        session: &ServerSideSession,
        client_ids: &[String],
    ) -> AuthResult<()> {
        if client_ids.is_empty() {
            return Ok(());
        }
        let removed = self
            .refresh_token_store
            .remove_by_session(&session.subject_id, &session.session_id, client_ids)
            .await?;
        debug!(
            subject_id = %session.subject_id,
            session_id = %session.session_id,
            removed,
            "Revoked session-bound refresh tokens"
        );
        Ok(())
    }

    async fn notify_clients(&self, session: &ServerSideSession, client_ids: &[String]) {
        for client_id in client_ids {
            let client = match self.client_store.find_by_client_id(client_id).await {
                Ok(Some(client)) => client,
                Ok(None) => continue,
                Err(e) => {
                    warn!(client_id, error = %e, "Client lookup failed during logout fan-out");
                    continue;
                }
            };

            let Some(logout_uri) = client.back_channel_logout_uri.clone() else {
                continue;
            };

            let request = BackChannelLogoutRequest {
                client_id: client_id.clone(),
                logout_uri,
                claims: self.logout_token_claims(session, client_id),
            };

            if let Err(e) = self.logout_notifier.send(&request).await {
                warn!(client_id, error = %e, "Back-channel logout delivery failed");
            }
        }
    }

    /// Builds logout token claims per OIDC Back-Channel Logout 1.0.
    fn logout_token_claims(
        &self,
        session: &ServerSideSession,
        client_id: &str,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut claims = serde_json::Map::new();
        claims.insert("iss".into(), json!(self.issuer));
        claims.insert("aud".into(), json!(client_id));
        claims.insert("sub".into(), json!(session.subject_id));
        claims.insert("sid".into(), json!(session.session_id));
        claims.insert(
            "iat".into(),
            json!(OffsetDateTime::now_utc().unix_timestamp()),
        );
        claims.insert("jti".into(), json!(Uuid::new_v4().to_string()));
        claims.insert(
            "events".into(),
            json!({"http://schemas.openid.net/event/backchannel-logout": {}}),
        );
        claims
    }
}
