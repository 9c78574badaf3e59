//! In-memory server-side sessions and a recording logout notifier.

use aegis_auth::AuthResult;
use aegis_auth::error::AuthError;
use aegis_auth::session::{BackChannelLogoutNotifier, BackChannelLogoutRequest, ServerSideSession};
use aegis_auth::storage::ServerSideSessionStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;

/// Session store over a concurrent map keyed by subject+session id.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<(String, String), ServerSideSession>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServerSideSessionStore for InMemorySessionStore {
    async fn store(&self, session: &ServerSideSession) -> AuthResult<()> {
        self.sessions.insert(
            (session.subject_id.clone(), session.session_id.clone()),
            session.clone(),
        );
        Ok(())
    }

    async fn find_by_subject_and_session(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> AuthResult<Option<ServerSideSession>> {
        Ok(self
            .sessions
            .get(&(subject_id.to_string(), session_id.to_string()))
            .map(|entry| entry.clone()))
    }

    async fn update(&self, session: &ServerSideSession) -> AuthResult<()> {
        let key = (session.subject_id.clone(), session.session_id.clone());
        if !self.sessions.contains_key(&key) {
            return Err(AuthError::invalid_grant("Session not found"));
        }
        self.sessions.insert(key, session.clone());
        Ok(())
    }

    async fn delete(&self, subject_id: &str, session_id: &str) -> AuthResult<()> {
        self.sessions
            .remove(&(subject_id.to_string(), session_id.to_string()));
        Ok(())
    }

    async fn take_expired(&self, limit: usize) -> AuthResult<Vec<ServerSideSession>> {
        let expired_keys: Vec<(String, String)> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired())
            .take(limit)
            .map(|entry| entry.key().clone())
            .collect();

        let mut taken = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            if let Some((_, session)) = self.sessions.remove(&key) {
                taken.push(session);
            }
        }
        Ok(taken)
    }
}

/// Logout notifier that records every request instead of delivering it.
///
/// Lets tests and development setups observe the back-channel logout
/// fan-out without an HTTP stack.
#[derive(Default)]
pub struct RecordingLogoutNotifier {
    sent: Mutex<Vec<BackChannelLogoutRequest>>,
}

impl RecordingLogoutNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded notification.
    #[must_use]
    pub fn sent(&self) -> Vec<BackChannelLogoutRequest> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }
}

#[async_trait]
impl BackChannelLogoutNotifier for RecordingLogoutNotifier {
    async fn send(&self, request: &BackChannelLogoutRequest) -> AuthResult<()> {
        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push(request.clone());
        Ok(())
    }
}
