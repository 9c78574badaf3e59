//! Client registration store trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Storage trait for client registrations.
///
/// The pipeline only reads clients; registration management is a separate
/// administrative concern.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Finds a client by its `client_id`.
    ///
    /// Returns registrations regardless of their `active` flag; callers
    /// decide how inactive clients are reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;
}
