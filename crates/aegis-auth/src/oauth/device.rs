//! Device authorization flow (RFC 8628).
//!
//! [`DeviceFlowService`] creates and resolves device/user code pairs;
//! [`DeviceCodeValidator`] is the token-endpoint polling state machine.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::AuthResult;
use crate::config::DeviceFlowConfig;
use crate::error::AuthError;
use crate::oauth::throttle::PollThrottle;
use crate::storage::DeviceFlowStore;
use crate::types::grants::{generate_handle, generate_user_code};
use crate::types::{Client, DeviceCode, GrantRequestState, GrantType};

/// Throttle namespace for device codes.
const THROTTLE_KIND: &str = "device";

/// Response of the device authorization endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthorizationResponse {
    /// Code the device polls the token endpoint with.
    pub device_code: String,

    /// Code the user enters on the verification page.
    pub user_code: String,

    /// Artifact lifetime in seconds.
    pub expires_in: u64,

    /// Minimum polling interval in seconds.
    pub interval: u64,
}

/// What a successful device-code redemption carries into the pipeline.
#[derive(Debug, Clone)]
pub struct DeviceGrantOutcome {
    /// The approving subject.
    pub subject_id: String,

    /// Session captured at approval, if any.
    pub session_id: Option<String>,

    /// The scopes the user consented to.
    pub scopes: Vec<String>,

    /// Resource indicators from the initiation request.
    pub resource_indicators: Vec<String>,
}

// =============================================================================
// Initiation and approval
// =============================================================================

/// Creates device flow artifacts and applies end-user decisions.
pub struct DeviceFlowService {
    store: Arc<dyn DeviceFlowStore>,
    config: DeviceFlowConfig,
}

impl DeviceFlowService {
    /// Creates a new device flow service.
    #[must_use]
    pub fn new(store: Arc<dyn DeviceFlowStore>, config: DeviceFlowConfig) -> Self {
        Self { store, config }
    }

    /// Starts a device authorization: generates the code pair and stores
    /// the pending artifact.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized_client` if the client may not use the device
    /// grant, or a storage error.
    pub async fn start(
        &self,
        client: &Client,
        scopes: Vec<String>,
        resource_indicators: Vec<String>,
    ) -> AuthResult<DeviceAuthorizationResponse> {
        if !client.is_grant_type_allowed(&GrantType::DeviceCode) {
            return Err(AuthError::unauthorized_client(
                "Client may not use the device authorization grant",
            ));
        }

        let code = DeviceCode {
            device_code: generate_handle(),
            user_code: generate_user_code(self.config.user_code_length),
            client_id: client.client_id.clone(),
            requested_scopes: scopes,
            requested_resource_indicators: resource_indicators,
            state: GrantRequestState::Pending,
            subject_id: None,
            session_id: None,
            authorized_scopes: None,
            created_at: OffsetDateTime::now_utc(),
            lifetime_secs: self.config.code_lifetime.as_secs(),
        };
        self.store.store(&code).await?;

        Ok(DeviceAuthorizationResponse {
            device_code: code.device_code,
            user_code: code.user_code,
            expires_in: code.lifetime_secs,
            interval: self.config.polling_interval.as_secs(),
        })
    }

    /// Records the end user's approval for a user code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the user code is unknown,
    /// expired, or already decided.
    pub async fn approve(
        &self,
        user_code: &str,
        subject_id: &str,
        session_id: Option<&str>,
        consented_scopes: Vec<String>,
    ) -> AuthResult<()> {
        let mut code = self.pending_by_user_code(user_code).await?;
        code.state = GrantRequestState::Authorized;
        code.subject_id = Some(subject_id.to_string());
        code.session_id = session_id.map(str::to_string);
        code.authorized_scopes = Some(consented_scopes);
        self.store.update_by_user_code(user_code, &code).await
    }

    /// Records the end user's denial for a user code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the user code is unknown,
    /// expired, or already decided.
    pub async fn deny(&self, user_code: &str) -> AuthResult<()> {
        let mut code = self.pending_by_user_code(user_code).await?;
        code.state = GrantRequestState::Denied;
        self.store.update_by_user_code(user_code, &code).await
    }

    async fn pending_by_user_code(&self, user_code: &str) -> AuthResult<DeviceCode> {
        let code = self
            .store
            .find_by_user_code(user_code)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Unknown user code"))?;
        if code.is_expired() {
            return Err(AuthError::invalid_grant("User code has expired"));
        }
        if code.state != GrantRequestState::Pending {
            return Err(AuthError::invalid_grant("User code was already decided"));
        }
        Ok(code)
    }
}

// =============================================================================
// Token endpoint polling
// =============================================================================

/// The device-code polling state machine at the token endpoint.
pub struct DeviceCodeValidator {
    store: Arc<dyn DeviceFlowStore>,
    throttle: Arc<PollThrottle>,
    config: DeviceFlowConfig,
}

impl DeviceCodeValidator {
    /// Creates a new validator.
    #[must_use]
    pub fn new(
        store: Arc<dyn DeviceFlowStore>,
        throttle: Arc<PollThrottle>,
        config: DeviceFlowConfig,
    ) -> Self {
        Self {
            store,
            throttle,
            config,
        }
    }

    /// Validates one token-endpoint poll for a device code.
    ///
    /// On success the artifact is consumed (deleted) so it can never be
    /// redeemed twice.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` - unknown code or wrong client
    /// - `slow_down` - poll inside the configured interval
    /// - `expired_token` - artifact lifetime elapsed
    /// - `access_denied` - the user denied the request
    /// - `authorization_pending` - not yet decided
    pub async fn validate(
        &self,
        device_code: &str,
        client: &Client,
    ) -> AuthResult<DeviceGrantOutcome> {
        let code = self
            .store
            .find_by_device_code(device_code)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid device code"))?;

        if code.client_id != client.client_id {
            debug!(
                client_id = %client.client_id,
                issued_to = %code.client_id,
                "Device code client binding mismatch"
            );
            return Err(AuthError::invalid_grant(
                "Device code was issued to a different client",
            ));
        }

        self.throttle
            .check_poll(
                THROTTLE_KIND,
                device_code,
                self.config.polling_interval,
                self.config.code_lifetime,
            )
            .await?;

        if code.is_expired() {
            return Err(AuthError::expired_token("Device code has expired"));
        }

        match code.state {
            GrantRequestState::Pending => Err(AuthError::AuthorizationPending),
            GrantRequestState::Denied => {
                // Terminal: drop the artifact.
                self.store.remove_by_device_code(device_code).await?;
                Err(AuthError::access_denied("The user denied the request"))
            }
            GrantRequestState::Authorized => {
                let subject_id = code.subject_id.clone().ok_or_else(|| {
                    AuthError::internal("Authorized device code has no subject")
                })?;
                let scopes = code
                    .authorized_scopes
                    .clone()
                    .unwrap_or_else(|| code.requested_scopes.clone());

                // One-shot consume: first successful redemption wins.
                self.store.remove_by_device_code(device_code).await?;

                Ok(DeviceGrantOutcome {
                    subject_id,
                    session_id: code.session_id.clone(),
                    scopes,
                    resource_indicators: code.requested_resource_indicators.clone(),
                })
            }
        }
    }
}
