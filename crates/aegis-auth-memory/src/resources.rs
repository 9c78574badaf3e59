//! In-memory resource registrations.

use aegis_auth::AuthResult;
use aegis_auth::storage::ResourceStore;
use aegis_auth::types::{ApiResource, ApiScope, IdentityResource, Resources};
use async_trait::async_trait;
use dashmap::DashMap;

/// Resource store over concurrent maps keyed by name.
#[derive(Default)]
pub struct InMemoryResourceStore {
    identity_resources: DashMap<String, IdentityResource>,
    api_scopes: DashMap<String, ApiScope>,
    api_resources: DashMap<String, ApiResource>,
}

impl InMemoryResourceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an identity resource.
    pub fn add_identity_resource(&self, resource: IdentityResource) {
        self.identity_resources.insert(resource.name.clone(), resource);
    }

    /// Registers an API scope.
    pub fn add_api_scope(&self, scope: ApiScope) {
        self.api_scopes.insert(scope.name.clone(), scope);
    }

    /// Registers an API resource.
    pub fn add_api_resource(&self, resource: ApiResource) {
        self.api_resources.insert(resource.name.clone(), resource);
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn find_resources_by_scope_names(
        &self,
        scope_names: &[String],
    ) -> AuthResult<Resources> {
        let identity_resources: Vec<IdentityResource> = self
            .identity_resources
            .iter()
            .filter(|entry| entry.enabled && scope_names.contains(&entry.name))
            .map(|entry| entry.clone())
            .collect();

        let api_scopes: Vec<ApiScope> = self
            .api_scopes
            .iter()
            .filter(|entry| entry.enabled && scope_names.contains(&entry.name))
            .map(|entry| entry.clone())
            .collect();

        let api_resources: Vec<ApiResource> = self
            .api_resources
            .iter()
            .filter(|entry| {
                entry.enabled
                    && entry
                        .scopes
                        .iter()
                        .any(|scope| api_scopes.iter().any(|matched| &matched.name == scope))
            })
            .map(|entry| entry.clone())
            .collect();

        Ok(Resources {
            identity_resources,
            api_scopes,
            api_resources,
            offline_access: false,
        })
    }

    async fn find_api_resources_by_names(
        &self,
        names: &[String],
    ) -> AuthResult<Vec<ApiResource>> {
        Ok(self
            .api_resources
            .iter()
            .filter(|entry| names.contains(&entry.name))
            .map(|entry| entry.clone())
            .collect())
    }
}
