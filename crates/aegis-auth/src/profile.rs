//! Subject activity checks.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Pluggable check that a subject is still allowed to receive tokens.
///
/// Consulted during grant validation and inbound token validation: a
/// disabled or deleted user fails the check and the request is rejected
/// with `invalid_grant` even when the grant artifact itself is valid.
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// Returns `true` if the subject is active for the given client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying user store fails.
    async fn is_active(&self, subject_id: &str, client: &Client) -> AuthResult<bool>;
}

/// Profile service that treats every subject as active.
///
/// The default for deployments without a user store integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllProfiles;

#[async_trait]
impl ProfileService for AllowAllProfiles {
    async fn is_active(&self, _subject_id: &str, _client: &Client) -> AuthResult<bool> {
        Ok(true)
    }
}
