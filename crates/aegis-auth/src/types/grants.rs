//! Single-use grant artifact types.
//!
//! Authorization codes, device codes, and backchannel authentication
//! requests share a lifecycle: created at flow initiation with a creation
//! time and a lifetime in seconds, then redeemed exactly once at the token
//! endpoint. Device and backchannel artifacts are additionally polled
//! repeatedly until they reach a terminal state.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Generates a 256-bit random handle encoded as base64url (43 characters).
#[must_use]
pub fn generate_handle() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates a user code from a confusion-resistant alphabet
/// (no `0`/`O`, `1`/`I`/`L`, or vowels that spell words).
#[must_use]
pub fn generate_user_code(length: usize) -> String {
    const ALPHABET: &[u8] = b"BCDFGHJKMNPQRSTVWXZ23456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rand::Rng::gen_range(&mut rng, 0..ALPHABET.len())] as char)
        .collect()
}

/// Progress of a polled grant artifact toward a terminal state.
///
/// Expiration is not a stored state; it is computed from the creation
/// time and lifetime whenever the artifact is examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrantRequestState {
    /// Awaiting end-user approval.
    #[default]
    Pending,
    /// The end user approved the request.
    Authorized,
    /// The end user denied the request.
    Denied,
}

// =============================================================================
// Authorization code
// =============================================================================

/// An authorization code issued at the authorize endpoint.
///
/// Read-once-and-deleted at token redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationCode {
    /// Client the code was issued to.
    pub client_id: String,

    /// Authenticated subject.
    pub subject_id: String,

    /// Server-side session the code was issued under, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Scopes granted at authorization time.
    pub requested_scopes: Vec<String>,

    /// RFC 8707 resource indicators granted at authorization time.
    #[serde(default)]
    pub requested_resource_indicators: Vec<String>,

    /// Redirect URI the code was bound to.
    pub redirect_uri: String,

    /// PKCE code challenge, if the authorization request carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method (`plain` or `S256`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// DPoP key thumbprint bound at authorization time, if any.
    /// Redemption must present a proof from the same key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpop_key_thumbprint: Option<String>,

    /// OIDC nonce to echo into the identity token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// When the code was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Lifetime in seconds.
    pub lifetime_secs: u64,
}

impl AuthorizationCode {
    /// When this code expires.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.created_at + Duration::seconds(self.lifetime_secs as i64)
    }

    /// Returns `true` if the code has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at()
    }
}

// =============================================================================
// Device code
// =============================================================================

/// A device authorization grant artifact (RFC 8628).
///
/// Created with a device code (polled by the device) and a user code
/// (entered by the user on a second screen). Polled until authorized,
/// denied, or expired; consumed on the first successful redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCode {
    /// Opaque code the device polls the token endpoint with.
    pub device_code: String,

    /// Short code the end user enters during verification.
    pub user_code: String,

    /// Client the code was issued to.
    pub client_id: String,

    /// Scopes requested at initiation.
    pub requested_scopes: Vec<String>,

    /// RFC 8707 resource indicators requested at initiation.
    #[serde(default)]
    pub requested_resource_indicators: Vec<String>,

    /// Approval progress.
    #[serde(default)]
    pub state: GrantRequestState,

    /// Subject that approved the request. Set on authorization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// Session id captured at approval, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Scopes the user actually consented to. Set on authorization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_scopes: Option<Vec<String>>,

    /// When the artifact was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Lifetime in seconds.
    pub lifetime_secs: u64,
}

impl DeviceCode {
    /// When this artifact expires.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.created_at + Duration::seconds(self.lifetime_secs as i64)
    }

    /// Returns `true` if the artifact has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at()
    }
}

// =============================================================================
// Backchannel authentication request
// =============================================================================

/// A CIBA backchannel authentication request.
///
/// Created at the backchannel-authentication endpoint; the client polls
/// the token endpoint with the returned `auth_req_id` until the user
/// completes or denies authentication out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackchannelAuthRequest {
    /// The `auth_req_id` handle returned to the client.
    pub auth_req_id: String,

    /// Client the request was created for.
    pub client_id: String,

    /// Hint identifying the end user to authenticate.
    pub login_hint: String,

    /// Scopes requested at initiation.
    pub requested_scopes: Vec<String>,

    /// RFC 8707 resource indicators requested at initiation.
    #[serde(default)]
    pub requested_resource_indicators: Vec<String>,

    /// Binding message displayed on the authentication device, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_message: Option<String>,

    /// Approval progress.
    #[serde(default)]
    pub state: GrantRequestState,

    /// Subject that completed authentication. Set on authorization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// Session id captured at approval, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Scopes the user consented to. Set on authorization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_scopes: Option<Vec<String>>,

    /// When the request was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Lifetime in seconds.
    pub lifetime_secs: u64,
}

impl BackchannelAuthRequest {
    /// When this request expires.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.created_at + Duration::seconds(self.lifetime_secs as i64)
    }

    /// Returns `true` if the request has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at()
    }
}
