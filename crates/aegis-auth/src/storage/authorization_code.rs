//! Authorization code store trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::AuthorizationCode;

/// Storage trait for authorization codes.
///
/// Codes are single-use: the grant validator reads the record, validates
/// it, and removes it in the same redemption, regardless of outcome once
/// the record was located (best-effort cleanup on failure paths).
#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    /// Stores a code under the given handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn store(&self, handle: &str, code: &AuthorizationCode) -> AuthResult<()>;

    /// Finds a code by its handle.
    ///
    /// Returns records regardless of expiration; callers check
    /// [`AuthorizationCode::is_expired`].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, handle: &str) -> AuthResult<Option<AuthorizationCode>>;

    /// Removes a code by its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove(&self, handle: &str) -> AuthResult<()>;

    /// Deletes expired codes. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
