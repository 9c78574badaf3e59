//! In-memory client registrations.

use aegis_auth::AuthResult;
use aegis_auth::storage::ClientStore;
use aegis_auth::types::Client;
use async_trait::async_trait;
use dashmap::DashMap;

/// Client store over a concurrent map.
#[derive(Default)]
pub struct InMemoryClientStore {
    clients: DashMap<String, Client>,
}

impl InMemoryClientStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a client.
    pub fn add(&self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|entry| entry.clone()))
    }
}
