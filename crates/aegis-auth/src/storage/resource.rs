//! Resource registration store trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{ApiResource, Resources};

/// Storage trait for protected resource registrations.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Finds all enabled resources matching the given scope names:
    /// identity resources and API scopes whose name is in `scope_names`,
    /// plus every API resource covering one of the matched API scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_resources_by_scope_names(&self, scope_names: &[String])
    -> AuthResult<Resources>;

    /// Finds enabled API resources by exact name (resource indicators).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_api_resources_by_names(&self, names: &[String])
    -> AuthResult<Vec<ApiResource>>;
}
