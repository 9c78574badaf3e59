//! Refresh token store trait.
//!
//! # Security Considerations
//!
//! - Handles are stored as SHA-256 hashes only
//! - Rotation (delete or mark-consumed plus re-create) must leave exactly
//!   one valid handle per one-time-use token
//! - Expired tokens should be cleaned up periodically

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::RefreshToken;

/// Storage trait for refresh tokens.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Stores a new refresh token (with hashed handle).
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    async fn store(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Finds a refresh token by its handle hash.
    ///
    /// Returns tokens regardless of expiration/consumption status;
    /// callers run the validation sequence before use.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_handle_hash(&self, handle_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Replaces an existing token record (sliding extension, consumption).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if no record with the token's id
    /// exists, or an error if the storage operation fails.
    async fn update(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Removes a refresh token by its handle hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_by_handle_hash(&self, handle_hash: &str) -> AuthResult<()>;

    /// Removes a refresh token by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_by_id(&self, id: Uuid) -> AuthResult<()>;

    /// Removes all refresh tokens for a subject+session pair restricted to
    /// the given clients. Used by session logout/expiration fan-out.
    ///
    /// Returns the number of tokens removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn remove_by_session(
        &self,
        subject_id: &str,
        session_id: &str,
        client_ids: &[String],
    ) -> AuthResult<u64>;

    /// Deletes expired tokens. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
