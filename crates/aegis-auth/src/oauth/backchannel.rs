//! Client-Initiated Backchannel Authentication (CIBA).
//!
//! [`BackchannelAuthService`] creates authentication requests at the
//! backchannel-authentication endpoint; [`BackchannelRequestValidator`] is
//! the token-endpoint polling state machine for `auth_req_id`.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::AuthResult;
use crate::config::CibaConfig;
use crate::error::AuthError;
use crate::oauth::throttle::PollThrottle;
use crate::storage::BackchannelRequestStore;
use crate::types::grants::generate_handle;
use crate::types::{BackchannelAuthRequest, Client, GrantRequestState, GrantType};

/// Throttle namespace for backchannel requests.
const THROTTLE_KIND: &str = "ciba";

/// Response of the backchannel-authentication endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BackchannelAuthResponse {
    /// Handle the client polls the token endpoint with.
    pub auth_req_id: String,

    /// Request lifetime in seconds.
    pub expires_in: u64,

    /// Minimum polling interval in seconds.
    pub interval: u64,
}

/// What a successful CIBA redemption carries into the pipeline.
#[derive(Debug, Clone)]
pub struct BackchannelGrantOutcome {
    /// The authenticated subject.
    pub subject_id: String,

    /// Session captured at completion, if any.
    pub session_id: Option<String>,

    /// The scopes the user consented to.
    pub scopes: Vec<String>,

    /// Resource indicators from the initiation request.
    pub resource_indicators: Vec<String>,
}

// =============================================================================
// Initiation and completion
// =============================================================================

/// Creates backchannel authentication requests and applies the outcome of
/// the out-of-band authentication.
pub struct BackchannelAuthService {
    store: Arc<dyn BackchannelRequestStore>,
    config: CibaConfig,
}

impl BackchannelAuthService {
    /// Creates a new backchannel authentication service.
    #[must_use]
    pub fn new(store: Arc<dyn BackchannelRequestStore>, config: CibaConfig) -> Self {
        Self { store, config }
    }

    /// Starts a backchannel authentication request.
    ///
    /// A client-requested expiry is honored up to the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized_client` if the client may not use the CIBA
    /// grant, `invalid_request` if no login hint identifies the user, or a
    /// storage error.
    pub async fn start(
        &self,
        client: &Client,
        login_hint: &str,
        scopes: Vec<String>,
        resource_indicators: Vec<String>,
        binding_message: Option<String>,
        requested_expiry_secs: Option<u64>,
    ) -> AuthResult<BackchannelAuthResponse> {
        if !client.is_grant_type_allowed(&GrantType::Ciba) {
            return Err(AuthError::unauthorized_client(
                "Client may not use the CIBA grant",
            ));
        }
        if login_hint.is_empty() {
            return Err(AuthError::invalid_request(
                "A login hint identifying the end user is required",
            ));
        }

        let max = self.config.request_lifetime.as_secs();
        let lifetime_secs = requested_expiry_secs.map_or(max, |requested| requested.min(max));

        let request = BackchannelAuthRequest {
            auth_req_id: generate_handle(),
            client_id: client.client_id.clone(),
            login_hint: login_hint.to_string(),
            requested_scopes: scopes,
            requested_resource_indicators: resource_indicators,
            binding_message,
            state: GrantRequestState::Pending,
            subject_id: None,
            session_id: None,
            authorized_scopes: None,
            created_at: OffsetDateTime::now_utc(),
            lifetime_secs,
        };
        self.store.store(&request).await?;

        Ok(BackchannelAuthResponse {
            auth_req_id: request.auth_req_id,
            expires_in: lifetime_secs,
            interval: self.config.polling_interval.as_secs(),
        })
    }

    /// Records a completed out-of-band authentication.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the request is unknown,
    /// expired, or already decided.
    pub async fn complete(
        &self,
        auth_req_id: &str,
        subject_id: &str,
        session_id: Option<&str>,
        consented_scopes: Vec<String>,
    ) -> AuthResult<()> {
        let mut request = self.pending(auth_req_id).await?;
        request.state = GrantRequestState::Authorized;
        request.subject_id = Some(subject_id.to_string());
        request.session_id = session_id.map(str::to_string);
        request.authorized_scopes = Some(consented_scopes);
        self.store.update(&request).await
    }

    /// Records a denied out-of-band authentication.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if the request is unknown,
    /// expired, or already decided.
    pub async fn deny(&self, auth_req_id: &str) -> AuthResult<()> {
        let mut request = self.pending(auth_req_id).await?;
        request.state = GrantRequestState::Denied;
        self.store.update(&request).await
    }

    async fn pending(&self, auth_req_id: &str) -> AuthResult<BackchannelAuthRequest> {
        let request = self
            .store
            .find_by_auth_req_id(auth_req_id)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Unknown authentication request"))?;
        if request.is_expired() {
            return Err(AuthError::invalid_grant("Authentication request has expired"));
        }
        if request.state != GrantRequestState::Pending {
            return Err(AuthError::invalid_grant(
                "Authentication request was already decided",
            ));
        }
        Ok(request)
    }
}

// =============================================================================
// Token endpoint polling
// =============================================================================

/// The CIBA polling state machine at the token endpoint.
pub struct BackchannelRequestValidator {
    store: Arc<dyn BackchannelRequestStore>,
    throttle: Arc<PollThrottle>,
    config: CibaConfig,
}

impl BackchannelRequestValidator {
    /// Creates a new validator.
    #[must_use]
    pub fn new(
        store: Arc<dyn BackchannelRequestStore>,
        throttle: Arc<PollThrottle>,
        config: CibaConfig,
    ) -> Self {
        Self {
            store,
            throttle,
            config,
        }
    }

    /// Validates one token-endpoint poll for an `auth_req_id`.
    ///
    /// On success the request is consumed (deleted) so it can never be
    /// redeemed twice.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` - unknown id or wrong client
    /// - `slow_down` - poll inside the configured interval
    /// - `expired_token` - request lifetime elapsed
    /// - `access_denied` - the user denied authentication
    /// - `authorization_pending` - not yet decided
    pub async fn validate(
        &self,
        auth_req_id: &str,
        client: &Client,
    ) -> AuthResult<BackchannelGrantOutcome> {
        let request = self
            .store
            .find_by_auth_req_id(auth_req_id)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid auth_req_id"))?;

        if request.client_id != client.client_id {
            debug!(
                client_id = %client.client_id,
                issued_to = %request.client_id,
                "Backchannel request client binding mismatch"
            );
            return Err(AuthError::invalid_grant(
                "Authentication request belongs to a different client",
            ));
        }

        self.throttle
            .check_poll(
                THROTTLE_KIND,
                auth_req_id,
                self.config.polling_interval,
                self.config.request_lifetime,
            )
            .await?;

        if request.is_expired() {
            return Err(AuthError::expired_token(
                "Authentication request has expired",
            ));
        }

        match request.state {
            GrantRequestState::Pending => Err(AuthError::AuthorizationPending),
            GrantRequestState::Denied => {
                self.store.remove(auth_req_id).await?;
                Err(AuthError::access_denied("The user denied authentication"))
            }
            GrantRequestState::Authorized => {
                let subject_id = request.subject_id.clone().ok_or_else(|| {
                    AuthError::internal("Authorized backchannel request has no subject")
                })?;
                let scopes = request
                    .authorized_scopes
                    .clone()
                    .unwrap_or_else(|| request.requested_scopes.clone());

                // One-shot consume.
                self.store.remove(auth_req_id).await?;

                Ok(BackchannelGrantOutcome {
                    subject_id,
                    session_id: request.session_id.clone(),
                    scopes,
                    resource_indicators: request.requested_resource_indicators.clone(),
                })
            }
        }
    }
}
