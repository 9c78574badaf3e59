//! Server-side session store trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::session::ServerSideSession;

/// Storage trait for server-side user sessions.
#[async_trait]
pub trait ServerSideSessionStore: Send + Sync {
    /// Stores a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn store(&self, session: &ServerSideSession) -> AuthResult<()>;

    /// Finds a session by subject id and session id.
    ///
    /// Returns sessions regardless of expiration; callers check
    /// [`ServerSideSession::is_expired`].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_subject_and_session(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> AuthResult<Option<ServerSideSession>>;

    /// Replaces an existing session (sliding renewal, client-id updates).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if no session with the same
    /// subject+session ids exists, or an error if the operation fails.
    async fn update(&self, session: &ServerSideSession) -> AuthResult<()>;

    /// Deletes a session by subject id and session id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, subject_id: &str, session_id: &str) -> AuthResult<()>;

    /// Removes and returns up to `limit` expired sessions, for
    /// expiration fan-out processing.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn take_expired(&self, limit: usize) -> AuthResult<Vec<ServerSideSession>>;
}
