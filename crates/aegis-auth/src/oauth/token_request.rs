//! Token endpoint request and response types.
//!
//! [`TokenRequestParams`] is the raw, form-decoded input. The orchestrator
//! refines it into a [`ValidatedTokenRequest`] — the accumulator for one
//! request's validated state, owned exclusively by that request's
//! validation pass and discarded after response construction.

use serde::{Deserialize, Serialize};

use crate::types::{Client, Confirmation, GrantType, ProofType, RefreshToken, Resources};

/// Raw token request parameters (form-encoded body plus the `DPoP` header).
///
/// Different fields are required depending on `grant_type`:
///
/// - `authorization_code`: code, redirect_uri, code_verifier
/// - `refresh_token`: refresh_token
/// - `urn:ietf:params:oauth:grant-type:device_code`: device_code
/// - `urn:openid:params:grant-type:ciba`: auth_req_id
/// - `password`: username, password
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequestParams {
    /// OAuth 2.0 grant type. Required.
    pub grant_type: String,

    /// Authorization code (authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI (must match the authorization request).
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE code verifier (authorization_code grant).
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Refresh token handle (refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Device code (device_code grant).
    #[serde(default)]
    pub device_code: Option<String>,

    /// Backchannel auth request id (CIBA grant).
    #[serde(default)]
    pub auth_req_id: Option<String>,

    /// Username (password grant).
    #[serde(default)]
    pub username: Option<String>,

    /// Password (password grant).
    #[serde(default)]
    pub password: Option<String>,

    /// Requested scope (space-separated).
    #[serde(default)]
    pub scope: Option<String>,

    /// RFC 8707 resource indicators. The token endpoint accepts at most
    /// one, but the raw request may carry several; the orchestrator
    /// rejects multiples.
    #[serde(default)]
    pub resource: Vec<String>,

    /// The DPoP proof JWT from the `DPoP` header, if present.
    /// The transport layer must reject more than one occurrence.
    #[serde(skip)]
    pub dpop_proof_token: Option<String>,
}

impl TokenRequestParams {
    /// The requested scopes, split on whitespace.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// The authenticated-client input to the orchestrator.
///
/// Client authentication itself happens before the pipeline (shared
/// secret, `private_key_jwt`, or mTLS); this carries its outcome.
#[derive(Debug, Clone)]
pub struct ClientValidationResult {
    /// The authenticated client.
    pub client: Client,

    /// `x5t#S256` thumbprint of the TLS client certificate, when the
    /// client authenticated over mTLS. Drives certificate-bound tokens.
    pub certificate_thumbprint: Option<String>,
}

/// Accumulator for one request's validated state.
///
/// Built incrementally by the orchestrator and the grant validators; no
/// other request ever observes it.
#[derive(Debug, Clone)]
pub struct ValidatedTokenRequest {
    /// The authenticated client.
    pub client: Client,

    /// The validated grant type.
    pub grant_type: GrantType,

    /// The authenticated subject, absent for machine-only grants.
    pub subject_id: Option<String>,

    /// Server-side session id carried by the grant artifact, if any.
    pub session_id: Option<String>,

    /// Resources granted to this request.
    pub resources: Resources,

    /// Proof-of-possession mechanism in effect, if any.
    pub proof_type: Option<ProofType>,

    /// Token confirmation derived from the proof, if any.
    pub confirmation: Option<Confirmation>,

    /// OIDC nonce to echo into the identity token, if any.
    pub nonce: Option<String>,

    /// The refresh token being rotated (refresh_token grant only).
    pub refresh_token: Option<RefreshToken>,

    /// The handle the rotated refresh token was presented under.
    pub refresh_token_handle: Option<String>,
}

impl ValidatedTokenRequest {
    /// Starts an accumulator for an authenticated client.
    #[must_use]
    pub fn new(client: Client, grant_type: GrantType) -> Self {
        Self {
            client,
            grant_type,
            subject_id: None,
            session_id: None,
            resources: Resources::default(),
            proof_type: None,
            confirmation: None,
            nonce: None,
            refresh_token: None,
            refresh_token_handle: None,
        }
    }
}

/// Outcome of the full token request validation pipeline.
#[derive(Debug, Clone)]
pub struct TokenRequestValidationResult {
    /// The fully validated request, ready for token issuance.
    pub validated: ValidatedTokenRequest,
}

/// A failed token request, plus any DPoP nonce the transport layer must
/// surface via the `DPoP-Nonce` response header.
#[derive(Debug)]
pub struct TokenRequestError {
    /// The failure.
    pub error: crate::error::AuthError,

    /// Fresh server-issued DPoP nonce, present when the failure is
    /// `use_dpop_nonce`.
    pub dpop_nonce: Option<String>,
}

impl From<crate::error::AuthError> for TokenRequestError {
    fn from(error: crate::error::AuthError) -> Self {
        Self {
            error,
            dpop_nonce: None,
        }
    }
}

/// Successful token response body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// The access token (JWT or reference handle).
    pub access_token: String,

    /// `Bearer`, or `DPoP` for DPoP-bound tokens.
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Refresh token handle, when `offline_access` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Identity token, when `openid` was granted and a subject exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}
