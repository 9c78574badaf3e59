//! The token request orchestrator.
//!
//! Drives the end-to-end validation pipeline for every grant type. The
//! sequence is fixed:
//!
//! 1. Client protocol type must be OIDC
//! 2. `grant_type` present and length-bounded
//! 3. At most one `resource` indicator, format-validated
//! 4. Proof-of-possession validation — once, before grant dispatch, with
//!    mTLS and DPoP mutually exclusive
//! 5. Dispatch to the grant-specific validator
//! 6. Subject activity check, resource/scope resolution, then the custom
//!    validation hook
//!
//! Each stage short-circuits; validation failures are logged with a
//! redacted request snapshot and reduced to the minimal external error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::dpop::{DpopProofContext, DpopProofValidator};
use crate::error::AuthError;
use crate::oauth::backchannel::BackchannelRequestValidator;
use crate::oauth::device::DeviceCodeValidator;
use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
use crate::oauth::resource_validator::{ResourceValidationRequest, ResourceValidator};
use crate::oauth::token_request::{
    ClientValidationResult, TokenRequestError, TokenRequestParams, TokenRequestValidationResult,
    ValidatedTokenRequest,
};
use crate::profile::ProfileService;
use crate::session::SessionCoordinationService;
use crate::storage::AuthorizationCodeStore;
use crate::token::refresh::RefreshTokenService;
use crate::types::{Client, Confirmation, GrantType, ProofType};

/// Result alias for the pipeline: a validated request, or an error plus
/// transport metadata (DPoP nonce).
pub type TokenRequestResult = Result<TokenRequestValidationResult, TokenRequestError>;

// =============================================================================
// Extension points
// =============================================================================

/// Outcome of a resource-owner password check.
#[derive(Debug, Clone)]
pub struct PasswordGrantOutcome {
    /// The authenticated subject.
    pub subject_id: String,

    /// Session to bind tokens to, if any.
    pub session_id: Option<String>,
}

/// Pluggable resource-owner password credential check.
#[async_trait]
pub trait ResourceOwnerPasswordValidator: Send + Sync {
    /// Validates a username/password pair for the given client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` for bad credentials.
    async fn validate(
        &self,
        username: &str,
        password: &str,
        client: &Client,
    ) -> AuthResult<PasswordGrantOutcome>;
}

/// Default password validator: rejects everything. Deployments that want
/// the password grant must plug in a real user store check.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllPasswordValidator;

#[async_trait]
impl ResourceOwnerPasswordValidator for DenyAllPasswordValidator {
    async fn validate(
        &self,
        _username: &str,
        _password: &str,
        _client: &Client,
    ) -> AuthResult<PasswordGrantOutcome> {
        Err(AuthError::invalid_grant("Invalid username or password"))
    }
}

/// Outcome of an extension grant validation.
#[derive(Debug, Clone, Default)]
pub struct ExtensionGrantOutcome {
    /// Subject established by the extension grant, if any.
    pub subject_id: Option<String>,

    /// Session established by the extension grant, if any.
    pub session_id: Option<String>,

    /// Scopes granted by the extension, `None` to use the requested ones.
    pub scopes: Option<Vec<String>>,
}

/// A registered extension grant validator.
#[async_trait]
pub trait ExtensionGrantValidator: Send + Sync {
    /// The `grant_type` value this validator handles.
    fn grant_type(&self) -> &str;

    /// Validates the extension grant.
    ///
    /// # Errors
    ///
    /// Returns the appropriate grant error on failure.
    async fn validate(
        &self,
        params: &TokenRequestParams,
        client: &Client,
    ) -> AuthResult<ExtensionGrantOutcome>;
}

/// Post-validation hook that can inspect and override the result.
#[async_trait]
pub trait CustomTokenRequestValidator: Send + Sync {
    /// Runs after grant dispatch and resource validation. Mutating the
    /// accumulator refines the result; returning an error overrides it
    /// with a failure.
    ///
    /// # Errors
    ///
    /// Any error fails the whole request.
    async fn validate(&self, validated: &mut ValidatedTokenRequest) -> AuthResult<()>;
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Validates token requests end to end.
pub struct TokenRequestValidator {
    config: AuthConfig,
    resource_validator: Arc<ResourceValidator>,
    refresh_service: Arc<RefreshTokenService>,
    dpop_validator: Arc<DpopProofValidator>,
    profile: Arc<dyn ProfileService>,
    sessions: Arc<SessionCoordinationService>,
    code_store: Arc<dyn AuthorizationCodeStore>,
    device_validator: Arc<DeviceCodeValidator>,
    backchannel_validator: Arc<BackchannelRequestValidator>,
    password_validator: Arc<dyn ResourceOwnerPasswordValidator>,
    extension_validators: Vec<Arc<dyn ExtensionGrantValidator>>,
    custom_validator: Option<Arc<dyn CustomTokenRequestValidator>>,
}

impl TokenRequestValidator {
    /// Creates the orchestrator with the required collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AuthConfig,
        resource_validator: Arc<ResourceValidator>,
        refresh_service: Arc<RefreshTokenService>,
        dpop_validator: Arc<DpopProofValidator>,
        profile: Arc<dyn ProfileService>,
        sessions: Arc<SessionCoordinationService>,
        code_store: Arc<dyn AuthorizationCodeStore>,
        device_validator: Arc<DeviceCodeValidator>,
        backchannel_validator: Arc<BackchannelRequestValidator>,
    ) -> Self {
        Self {
            config,
            resource_validator,
            refresh_service,
            dpop_validator,
            profile,
            sessions,
            code_store,
            device_validator,
            backchannel_validator,
            password_validator: Arc::new(DenyAllPasswordValidator),
            extension_validators: Vec::new(),
            custom_validator: None,
        }
    }

    /// Plugs in a password credential check.
    #[must_use]
    pub fn with_password_validator(
        mut self,
        validator: Arc<dyn ResourceOwnerPasswordValidator>,
    ) -> Self {
        self.password_validator = validator;
        self
    }

    /// Registers an extension grant validator.
    #[must_use]
    pub fn with_extension_grant(mut self, validator: Arc<dyn ExtensionGrantValidator>) -> Self {
        self.extension_validators.push(validator);
        self
    }

    /// Installs the post-validation hook.
    #[must_use]
    pub fn with_custom_validator(
        mut self,
        validator: Arc<dyn CustomTokenRequestValidator>,
    ) -> Self {
        self.custom_validator = Some(validator);
        self
    }

    /// Validates one token request for an already-authenticated client.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenRequestError`] carrying the OAuth error and, for
    /// `use_dpop_nonce`, the fresh nonce to surface to the client.
    pub async fn validate_request(
        &self,
        params: &TokenRequestParams,
        client_result: &ClientValidationResult,
    ) -> TokenRequestResult {
        let client = &client_result.client;
        debug!(
            client_id = %client.client_id,
            grant_type = %params.grant_type,
            scope = ?params.scope,
            resource = ?params.resource,
            "Validating token request"
        );

        // 1. Only OIDC clients are served by this pipeline.
        if client.protocol_type != "oidc" {
            warn!(
                client_id = %client.client_id,
                protocol_type = %client.protocol_type,
                "Token request for non-OIDC client"
            );
            return Err(AuthError::invalid_client("Invalid protocol type").into());
        }
        if !client.active {
            return Err(AuthError::invalid_client("Client is inactive").into());
        }

        // 2. grant_type: required and length-bounded.
        if params.grant_type.is_empty() {
            return Err(AuthError::invalid_request("Missing grant_type").into());
        }
        if params.grant_type.len() > self.config.oauth.max_grant_type_length {
            return Err(AuthError::invalid_request("grant_type is too long").into());
        }

        // 3. At most one resource indicator, format-validated up front.
        self.validate_resource_indicator_format(params)?;

        let grant_type = GrantType::parse(&params.grant_type);
        let mut validated = ValidatedTokenRequest::new(client.clone(), grant_type.clone());

        // 4. Proof-of-possession, once, before grant dispatch.
        self.validate_proof_of_possession(params, client_result, &mut validated)
            .await?;

        // 5. Grant dispatch.
        let (raw_scopes, raw_indicators) = match &grant_type {
            GrantType::AuthorizationCode => {
                self.validate_authorization_code_grant(params, &mut validated)
                    .await?
            }
            GrantType::ClientCredentials => {
                self.validate_client_credentials_grant(params, &mut validated)?
            }
            GrantType::Password => self.validate_password_grant(params, &mut validated).await?,
            GrantType::RefreshToken => {
                self.validate_refresh_token_grant(params, &mut validated)
                    .await?
            }
            GrantType::DeviceCode => {
                self.validate_device_code_grant(params, &mut validated)
                    .await?
            }
            GrantType::Ciba => self.validate_ciba_grant(params, &mut validated).await?,
            GrantType::Extension(_) => {
                self.validate_extension_grant(params, &mut validated).await?
            }
        };

        // Subject must still be active, for every grant that has one.
        if let Some(subject_id) = &validated.subject_id
            && !self.profile.is_active(subject_id, client).await?
        {
            debug!(client_id = %client.client_id, "Subject is no longer active");
            return Err(AuthError::invalid_grant("Subject is not active").into());
        }

        // Resource and scope resolution, fail-closed.
        let resource_result = self
            .resource_validator
            .validate_requested_resources(&ResourceValidationRequest {
                client,
                scopes: &raw_scopes,
                resource_indicators: &raw_indicators,
            })
            .await?;
        if !resource_result.succeeded() {
            if !resource_result.invalid_resource_indicators.is_empty() {
                return Err(AuthError::invalid_target(format!(
                    "Invalid resource indicator: {}",
                    resource_result.invalid_resource_indicators.join(" ")
                ))
                .into());
            }
            return Err(AuthError::invalid_scope(format!(
                "Invalid scope: {}",
                resource_result.invalid_scopes.join(" ")
            ))
            .into());
        }
        validated.resources = resource_result.resources;

        // Machine-only grants never get refresh tokens.
        if grant_type == GrantType::ClientCredentials && validated.resources.offline_access {
            return Err(AuthError::invalid_scope(
                "offline_access is not valid for client_credentials",
            )
            .into());
        }

        // 6. Custom hook runs last and can override the result.
        if let Some(custom) = &self.custom_validator {
            custom.validate(&mut validated).await?;
        }

        debug!(
            client_id = %validated.client.client_id,
            grant_type = %validated.grant_type,
            subject_id = ?validated.subject_id,
            "Token request validation succeeded"
        );

        Ok(TokenRequestValidationResult { validated })
    }

    // -------------------------------------------------------------------------
    // Request-level checks
    // -------------------------------------------------------------------------

    fn validate_resource_indicator_format(
        &self,
        params: &TokenRequestParams,
    ) -> Result<(), TokenRequestError> {
        if params.resource.len() > 1 {
            return Err(AuthError::invalid_target(
                "Multiple resource parameters are not allowed at the token endpoint",
            )
            .into());
        }
        if let Some(indicator) = params.resource.first() {
            if indicator.is_empty()
                || indicator.len() > self.config.oauth.max_resource_indicator_length
            {
                return Err(
                    AuthError::invalid_target("Invalid resource indicator value").into(),
                );
            }
            if Url::parse(indicator).is_err() {
                return Err(AuthError::invalid_target(
                    "Resource indicator must be a valid URI",
                )
                .into());
            }
        }
        Ok(())
    }

    async fn validate_proof_of_possession(
        &self,
        params: &TokenRequestParams,
        client_result: &ClientValidationResult,
        validated: &mut ValidatedTokenRequest,
    ) -> Result<(), TokenRequestError> {
        let has_dpop = params.dpop_proof_token.is_some();
        let has_mtls = client_result.certificate_thumbprint.is_some();

        // mTLS binding and DPoP are mutually exclusive.
        if has_dpop && has_mtls {
            return Err(AuthError::invalid_request(
                "Cannot combine a DPoP proof with an mTLS client certificate",
            )
            .into());
        }

        if let Some(proof_token) = &params.dpop_proof_token {
            let context = DpopProofContext {
                proof_token: proof_token.clone(),
                http_method: "POST".to_string(),
                http_url: self.config.token_endpoint.clone(),
            };
            let result = self.dpop_validator.validate(&context).await?;

            if let Some(error) = result.to_auth_error() {
                return Err(TokenRequestError {
                    error,
                    dpop_nonce: result.server_issued_nonce,
                });
            }

            let thumbprint = result.jwk_thumbprint.ok_or_else(|| {
                TokenRequestError::from(AuthError::internal(
                    "Valid proof produced no key thumbprint",
                ))
            })?;
            validated.proof_type = Some(ProofType::Dpop);
            validated.confirmation = Some(Confirmation::dpop(thumbprint));
        } else if let Some(thumbprint) = &client_result.certificate_thumbprint {
            validated.proof_type = Some(ProofType::ClientCertificate);
            validated.confirmation = Some(Confirmation::certificate(thumbprint.clone()));
        } else if validated.client.require_dpop {
            return Err(
                AuthError::invalid_request("Client requires a DPoP proof token").into(),
            );
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Grant validators
    // -------------------------------------------------------------------------

    async fn validate_authorization_code_grant(
        &self,
        params: &TokenRequestParams,
        validated: &mut ValidatedTokenRequest,
    ) -> Result<(Vec<String>, Vec<String>), TokenRequestError> {
        let client = &validated.client;
        self.require_grant_type(client, &GrantType::AuthorizationCode)?;

        let handle = params
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| TokenRequestError::from(AuthError::invalid_request("Missing code")))?;

        // Read-once: the code is removed as soon as it is located, so a
        // failed redemption still burns it.
        let code = self.code_store.find(handle).await?.ok_or_else(|| {
            TokenRequestError::from(AuthError::invalid_grant("Invalid authorization code"))
        })?;
        self.code_store.remove(handle).await?;

        if code.client_id != client.client_id {
            debug!(
                client_id = %client.client_id,
                issued_to = %code.client_id,
                "Authorization code client binding mismatch"
            );
            return Err(AuthError::invalid_grant(
                "Authorization code was issued to a different client",
            )
            .into());
        }

        if code.is_expired() {
            return Err(AuthError::invalid_grant("Authorization code has expired").into());
        }

        match (&code.redirect_uri, params.redirect_uri.as_deref()) {
            (expected, Some(actual)) if expected == actual => {}
            _ => {
                return Err(AuthError::invalid_grant(
                    "redirect_uri does not match the authorization request",
                )
                .into());
            }
        }

        // PKCE, when the authorization request carried a challenge.
        if let Some(challenge) = &code.code_challenge {
            let method = code
                .code_challenge_method
                .as_deref()
                .map(PkceChallengeMethod::parse)
                .transpose()
                .map_err(|_| {
                    TokenRequestError::from(AuthError::invalid_grant(
                        "Stored PKCE challenge method is invalid",
                    ))
                })?
                .unwrap_or_default();

            let verifier_raw = params.code_verifier.as_deref().ok_or_else(|| {
                TokenRequestError::from(AuthError::invalid_grant("Missing code_verifier"))
            })?;
            let verifier = PkceVerifier::new(verifier_raw.to_string()).map_err(|_| {
                TokenRequestError::from(AuthError::invalid_grant("Malformed code_verifier"))
            })?;
            let challenge = PkceChallenge::new(challenge.clone()).map_err(|_| {
                TokenRequestError::from(AuthError::invalid_grant(
                    "Stored PKCE challenge is invalid",
                ))
            })?;
            challenge.verify(&verifier, method).map_err(|_| {
                debug!(client_id = %client.client_id, "PKCE verification failed");
                TokenRequestError::from(AuthError::invalid_grant("PKCE verification failed"))
            })?;
        }

        // DPoP key continuity: a key bound at authorization time must be
        // the key proving this redemption.
        if let Some(bound) = &code.dpop_key_thumbprint {
            let presented = validated
                .confirmation
                .as_ref()
                .and_then(|cnf| cnf.jkt.as_deref());
            if presented != Some(bound.as_str()) {
                return Err(AuthError::invalid_grant(
                    "Authorization code is bound to a different DPoP key",
                )
                .into());
            }
        }

        // Requested indicators must stay inside the original authorization.
        for indicator in &params.resource {
            if !code.requested_resource_indicators.contains(indicator) {
                return Err(AuthError::invalid_target(
                    "Resource indicator was not part of the original authorization",
                )
                .into());
            }
        }
        let indicators = if params.resource.is_empty() {
            code.requested_resource_indicators.clone()
        } else {
            params.resource.clone()
        };

        validated.subject_id = Some(code.subject_id.clone());
        validated.session_id = code.session_id.clone();
        validated.nonce = code.nonce.clone();

        Ok((code.requested_scopes.clone(), indicators))
    }

    fn validate_client_credentials_grant(
        &self,
        params: &TokenRequestParams,
        validated: &mut ValidatedTokenRequest,
    ) -> Result<(Vec<String>, Vec<String>), TokenRequestError> {
        self.require_grant_type(&validated.client, &GrantType::ClientCredentials)?;

        let scopes = if params.scope.is_some() {
            params.scopes()
        } else {
            validated.client.allowed_scopes.clone()
        };

        Ok((scopes, params.resource.clone()))
    }

    async fn validate_password_grant(
        &self,
        params: &TokenRequestParams,
        validated: &mut ValidatedTokenRequest,
    ) -> Result<(Vec<String>, Vec<String>), TokenRequestError> {
        self.require_grant_type(&validated.client, &GrantType::Password)?;

        let username = params.username.as_deref().filter(|u| !u.is_empty());
        let password = params.password.as_deref();
        let (Some(username), Some(password)) = (username, password) else {
            return Err(AuthError::invalid_request("Missing username or password").into());
        };

        let outcome = self
            .password_validator
            .validate(username, password, &validated.client)
            .await?;
        validated.subject_id = Some(outcome.subject_id);
        validated.session_id = outcome.session_id;

        let scopes = if params.scope.is_some() {
            params.scopes()
        } else {
            validated.client.allowed_scopes.clone()
        };

        Ok((scopes, params.resource.clone()))
    }

    async fn validate_refresh_token_grant(
        &self,
        params: &TokenRequestParams,
        validated: &mut ValidatedTokenRequest,
    ) -> Result<(Vec<String>, Vec<String>), TokenRequestError> {
        let client = validated.client.clone();
        self.require_grant_type(&client, &GrantType::RefreshToken)?;

        let handle = params
            .refresh_token
            .as_deref()
            .filter(|handle| !handle.is_empty())
            .ok_or_else(|| {
                TokenRequestError::from(AuthError::invalid_request("Missing refresh_token"))
            })?;

        let token = self
            .refresh_service
            .validate_refresh_token(handle, &client)
            .await?;

        // Proof continuity: a PoP-bound refresh token must be renewed with
        // a proof from the same key.
        if let Some(bound) = &token.proof_key_thumbprint {
            let presented = validated.confirmation.as_ref().and_then(|cnf| {
                cnf.jkt.as_deref().or(cnf.x5t_s256.as_deref())
            });
            if presented != Some(bound.as_str()) {
                return Err(AuthError::invalid_grant(
                    "Refresh token is bound to a different proof key",
                )
                .into());
            }
        }

        // Requested scopes must be a subset of what was authorized.
        let requested = params.scopes();
        for scope in &requested {
            if !token.authorized_scopes.contains(scope) {
                return Err(AuthError::invalid_scope(format!(
                    "Scope {scope} exceeds the original authorization"
                ))
                .into());
            }
        }
        let scopes = if requested.is_empty() {
            token.authorized_scopes.clone()
        } else {
            requested
        };

        for indicator in &params.resource {
            if !token.authorized_resource_indicators.contains(indicator) {
                return Err(AuthError::invalid_target(
                    "Resource indicator was not part of the original authorization",
                )
                .into());
            }
        }
        let indicators = if params.resource.is_empty() {
            token.authorized_resource_indicators.clone()
        } else {
            params.resource.clone()
        };

        // Session coordination gates renewal for coordinated clients.
        self.sessions
            .validate_session(&client, &token.subject_id, token.session_id.as_deref())
            .await?;

        validated.subject_id = Some(token.subject_id.clone());
        validated.session_id = token.session_id.clone();
        validated.refresh_token = Some(token);
        validated.refresh_token_handle = Some(handle.to_string());

        Ok((scopes, indicators))
    }

    async fn validate_device_code_grant(
        &self,
        params: &TokenRequestParams,
        validated: &mut ValidatedTokenRequest,
    ) -> Result<(Vec<String>, Vec<String>), TokenRequestError> {
        self.require_grant_type(&validated.client, &GrantType::DeviceCode)?;

        let device_code = params
            .device_code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                TokenRequestError::from(AuthError::invalid_request("Missing device_code"))
            })?;

        let outcome = self
            .device_validator
            .validate(device_code, &validated.client)
            .await?;
        validated.subject_id = Some(outcome.subject_id);
        validated.session_id = outcome.session_id;

        Ok((outcome.scopes, outcome.resource_indicators))
    }

    async fn validate_ciba_grant(
        &self,
        params: &TokenRequestParams,
        validated: &mut ValidatedTokenRequest,
    ) -> Result<(Vec<String>, Vec<String>), TokenRequestError> {
        self.require_grant_type(&validated.client, &GrantType::Ciba)?;

        let auth_req_id = params
            .auth_req_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                TokenRequestError::from(AuthError::invalid_request("Missing auth_req_id"))
            })?;

        let outcome = self
            .backchannel_validator
            .validate(auth_req_id, &validated.client)
            .await?;
        validated.subject_id = Some(outcome.subject_id);
        validated.session_id = outcome.session_id;

        Ok((outcome.scopes, outcome.resource_indicators))
    }

    async fn validate_extension_grant(
        &self,
        params: &TokenRequestParams,
        validated: &mut ValidatedTokenRequest,
    ) -> Result<(Vec<String>, Vec<String>), TokenRequestError> {
        // An unregistered grant type is unsupported before it is
        // unauthorized.
        let validator = self
            .extension_validators
            .iter()
            .find(|candidate| candidate.grant_type() == params.grant_type)
            .ok_or_else(|| {
                TokenRequestError::from(AuthError::unsupported_grant_type(
                    params.grant_type.clone(),
                ))
            })?;

        let grant_type = validated.grant_type.clone();
        self.require_grant_type(&validated.client, &grant_type)?;

        let outcome = validator.validate(params, &validated.client).await?;
        validated.subject_id = outcome.subject_id;
        validated.session_id = outcome.session_id;

        let scopes = outcome.scopes.unwrap_or_else(|| params.scopes());
        Ok((scopes, params.resource.clone()))
    }

    fn require_grant_type(
        &self,
        client: &Client,
        grant_type: &GrantType,
    ) -> Result<(), TokenRequestError> {
        if client.is_grant_type_allowed(grant_type) {
            Ok(())
        } else {
            warn!(
                client_id = %client.client_id,
                grant_type = %grant_type,
                "Client is not allowed this grant type"
            );
            Err(AuthError::unauthorized_client(format!(
                "Client may not use grant type {grant_type}"
            ))
            .into())
        }
    }
}
