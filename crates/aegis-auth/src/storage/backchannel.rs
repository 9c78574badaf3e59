//! Backchannel authentication request store trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::BackchannelAuthRequest;

/// Storage trait for CIBA backchannel authentication requests.
#[async_trait]
pub trait BackchannelRequestStore: Send + Sync {
    /// Stores a new backchannel request.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn store(&self, request: &BackchannelAuthRequest) -> AuthResult<()>;

    /// Finds a request by its `auth_req_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_auth_req_id(
        &self,
        auth_req_id: &str,
    ) -> AuthResult<Option<BackchannelAuthRequest>>;

    /// Replaces the request identified by its `auth_req_id` (completion
    /// or denial of the out-of-band authentication).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if no record exists, or an error
    /// if the storage operation fails.
    async fn update(&self, request: &BackchannelAuthRequest) -> AuthResult<()>;

    /// Removes a request by its `auth_req_id` (one-shot consume on success).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove(&self, auth_req_id: &str) -> AuthResult<()>;

    /// Deletes expired requests. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
