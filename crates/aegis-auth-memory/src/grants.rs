//! In-memory grant artifact stores.

use aegis_auth::AuthResult;
use aegis_auth::error::AuthError;
use aegis_auth::storage::{AuthorizationCodeStore, BackchannelRequestStore, DeviceFlowStore};
use aegis_auth::types::{AuthorizationCode, BackchannelAuthRequest, DeviceCode};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

// =============================================================================
// Authorization codes
// =============================================================================

/// Authorization code store over a concurrent map.
#[derive(Default)]
pub struct InMemoryAuthorizationCodeStore {
    codes: DashMap<String, AuthorizationCode>,
}

impl InMemoryAuthorizationCodeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationCodeStore for InMemoryAuthorizationCodeStore {
    async fn store(&self, handle: &str, code: &AuthorizationCode) -> AuthResult<()> {
        self.codes.insert(handle.to_string(), code.clone());
        Ok(())
    }

    async fn find(&self, handle: &str) -> AuthResult<Option<AuthorizationCode>> {
        Ok(self.codes.get(handle).map(|entry| entry.clone()))
    }

    async fn remove(&self, handle: &str) -> AuthResult<()> {
        self.codes.remove(handle);
        Ok(())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired());
        Ok((before - self.codes.len()) as u64)
    }
}

// =============================================================================
// Device codes
// =============================================================================

/// Device flow store over a concurrent map keyed by device code.
///
/// The update-by-user-code read-modify-write runs under an explicit lock
/// so two concurrent decisions for the same user code cannot interleave.
#[derive(Default)]
pub struct InMemoryDeviceFlowStore {
    by_device_code: DashMap<String, DeviceCode>,
    user_code_update_lock: Mutex<()>,
}

impl InMemoryDeviceFlowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceFlowStore for InMemoryDeviceFlowStore {
    async fn store(&self, code: &DeviceCode) -> AuthResult<()> {
        self.by_device_code
            .insert(code.device_code.clone(), code.clone());
        Ok(())
    }

    async fn find_by_device_code(&self, device_code: &str) -> AuthResult<Option<DeviceCode>> {
        Ok(self.by_device_code.get(device_code).map(|entry| entry.clone()))
    }

    async fn find_by_user_code(&self, user_code: &str) -> AuthResult<Option<DeviceCode>> {
        Ok(self
            .by_device_code
            .iter()
            .find(|entry| entry.user_code == user_code)
            .map(|entry| entry.clone()))
    }

    async fn update_by_user_code(&self, user_code: &str, code: &DeviceCode) -> AuthResult<()> {
        let _guard = self.user_code_update_lock.lock().await;

        let device_code = self
            .by_device_code
            .iter()
            .find(|entry| entry.user_code == user_code)
            .map(|entry| entry.device_code.clone())
            .ok_or_else(|| AuthError::invalid_grant("Unknown user code"))?;

        self.by_device_code.insert(device_code, code.clone());
        Ok(())
    }

    async fn remove_by_device_code(&self, device_code: &str) -> AuthResult<()> {
        self.by_device_code.remove(device_code);
        Ok(())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let before = self.by_device_code.len();
        self.by_device_code.retain(|_, code| !code.is_expired());
        Ok((before - self.by_device_code.len()) as u64)
    }
}

// =============================================================================
// Backchannel authentication requests
// =============================================================================

/// Backchannel request store over a concurrent map.
#[derive(Default)]
pub struct InMemoryBackchannelRequestStore {
    requests: DashMap<String, BackchannelAuthRequest>,
}

impl InMemoryBackchannelRequestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackchannelRequestStore for InMemoryBackchannelRequestStore {
    async fn store(&self, request: &BackchannelAuthRequest) -> AuthResult<()> {
        self.requests
            .insert(request.auth_req_id.clone(), request.clone());
        Ok(())
    }

    async fn find_by_auth_req_id(
        &self,
        auth_req_id: &str,
    ) -> AuthResult<Option<BackchannelAuthRequest>> {
        Ok(self.requests.get(auth_req_id).map(|entry| entry.clone()))
    }

    async fn update(&self, request: &BackchannelAuthRequest) -> AuthResult<()> {
        if !self.requests.contains_key(&request.auth_req_id) {
            return Err(AuthError::invalid_grant("Unknown authentication request"));
        }
        self.requests
            .insert(request.auth_req_id.clone(), request.clone());
        Ok(())
    }

    async fn remove(&self, auth_req_id: &str) -> AuthResult<()> {
        self.requests.remove(auth_req_id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let before = self.requests.len();
        self.requests.retain(|_, request| !request.is_expired());
        Ok((before - self.requests.len()) as u64)
    }
}
