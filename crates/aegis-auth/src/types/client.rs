//! OAuth 2.0 / OIDC client registration types.
//!
//! This module defines the `Client` struct and the per-client policy knobs
//! the validation pipeline consults: allowed grant types and scopes,
//! refresh token rotation and expiration behavior, proof-of-possession
//! requirements, and session coordination.

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

use crate::types::secret::ClientSecret;

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 / OIDC grant types.
///
/// Defines the authorization flows a client is allowed to use. Extension
/// grants carry their registered URN/identifier verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow (with PKCE).
    AuthorizationCode,
    /// Client Credentials flow (confidential clients only).
    ClientCredentials,
    /// Refresh Token flow.
    RefreshToken,
    /// Resource Owner Password Credentials flow.
    /// WARNING: legacy; only for trusted first-party applications.
    Password,
    /// Device Authorization flow (RFC 8628).
    DeviceCode,
    /// Client-Initiated Backchannel Authentication (CIBA).
    Ciba,
    /// A registered extension grant, identified by its `grant_type` value.
    Extension(String),
}

impl GrantType {
    /// Returns the OAuth 2.0 `grant_type` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
            Self::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
            Self::Ciba => "urn:openid:params:grant-type:ciba",
            Self::Extension(value) => value.as_str(),
        }
    }

    /// Parses a `grant_type` parameter value into a known grant type.
    ///
    /// Unknown values are returned as [`GrantType::Extension`]; whether an
    /// extension grant is actually supported is decided by the registered
    /// extension validators, not here.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "authorization_code" => Self::AuthorizationCode,
            "client_credentials" => Self::ClientCredentials,
            "refresh_token" => Self::RefreshToken,
            "password" => Self::Password,
            "urn:ietf:params:oauth:grant-type:device_code" => Self::DeviceCode,
            "urn:openid:params:grant-type:ciba" => Self::Ciba,
            other => Self::Extension(other.to_string()),
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Token behavior enums
// =============================================================================

/// How access tokens are materialized for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessTokenType {
    /// Self-contained signed JWT.
    #[default]
    Jwt,
    /// Opaque handle resolved through the reference token store.
    Reference,
}

/// Refresh token reuse policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenUsage {
    /// The same handle stays valid until it expires.
    ReUse,
    /// Exactly one valid handle exists at a time; each redemption
    /// invalidates the presented handle and issues a new one.
    #[default]
    OneTimeOnly,
}

/// Refresh token expiration policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenExpiration {
    /// Fixed lifetime from creation.
    #[default]
    Absolute,
    /// Lifetime extends on each use, never beyond the absolute maximum.
    Sliding,
}

// =============================================================================
// Client
// =============================================================================

/// An OAuth 2.0 / OIDC client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Protocol type. The token pipeline only serves `oidc` clients.
    #[serde(default = "default_protocol_type")]
    pub protocol_type: String,

    /// Registered client secrets (hashed shared secrets, X.509 thumbprints).
    #[serde(default)]
    pub secrets: Vec<ClientSecret>,

    /// Human-readable display name.
    pub name: String,

    /// Grant types this client is allowed to use.
    pub grant_types: Vec<GrantType>,

    /// Scopes this client is allowed to request.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    /// Whether the client may request `offline_access` (refresh tokens).
    #[serde(default)]
    pub allow_offline_access: bool,

    /// Whether this client is currently active.
    pub active: bool,

    /// Access token lifetime in seconds. `None` uses the server default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_lifetime: Option<u64>,

    /// How access tokens are materialized (JWT or reference handle).
    #[serde(default)]
    pub access_token_type: AccessTokenType,

    /// Refresh token reuse policy.
    #[serde(default)]
    pub refresh_token_usage: RefreshTokenUsage,

    /// Refresh token expiration policy.
    #[serde(default)]
    pub refresh_token_expiration: RefreshTokenExpiration,

    /// Maximum refresh token lifetime in seconds, measured from creation.
    #[serde(default = "default_absolute_refresh_lifetime")]
    pub absolute_refresh_token_lifetime: u64,

    /// Sliding refresh token window in seconds. Only meaningful when
    /// `refresh_token_expiration` is `Sliding`.
    #[serde(default = "default_sliding_refresh_lifetime")]
    pub sliding_refresh_token_lifetime: u64,

    /// Whether every token request from this client must carry a DPoP proof.
    #[serde(default)]
    pub require_dpop: bool,

    /// Tie refresh/access token validity to the server-side user session.
    /// `None` falls back to the global `SessionConfig` default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate_lifetime_with_user_session: Option<bool>,

    /// JWS algorithms the server may use when signing this client's tokens.
    /// Empty means any configured server algorithm.
    #[serde(default)]
    pub allowed_signing_algorithms: Vec<String>,

    /// Inline JWKS for `private_key_jwt` client authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// Back-channel logout endpoint, notified on session logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_channel_logout_uri: Option<String>,
}

fn default_protocol_type() -> String {
    "oidc".to_string()
}

fn default_absolute_refresh_lifetime() -> u64 {
    2_592_000 // 30 days
}

fn default_sliding_refresh_lifetime() -> u64 {
    1_296_000 // 15 days
}

impl Client {
    /// Checks if the given grant type is allowed for this client.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: &GrantType) -> bool {
        self.grant_types.contains(grant_type)
    }

    /// Checks if the given scope is allowed for this client.
    ///
    /// An empty allow-list means no scopes are allowed; registrations are
    /// explicit. `offline_access` is special-cased via
    /// [`Client::allow_offline_access`] and never appears in the list.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        if scope == "offline_access" {
            return self.allow_offline_access;
        }
        self.allowed_scopes.iter().any(|allowed| allowed == scope)
    }

    /// Returns the access token lifetime in seconds, or the supplied default.
    #[must_use]
    pub fn access_token_lifetime_or(&self, default_secs: u64) -> u64 {
        self.access_token_lifetime.unwrap_or(default_secs)
    }

    /// Whether token validity for this client is coordinated with the
    /// server-side user session.
    #[must_use]
    pub fn coordinates_with_session(&self, global_default: bool) -> bool {
        self.coordinate_lifetime_with_user_session
            .unwrap_or(global_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client {
            client_id: "app".to_string(),
            protocol_type: "oidc".to_string(),
            secrets: vec![],
            name: "Test App".to_string(),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            allowed_scopes: vec!["openid".to_string(), "api1.read".to_string()],
            allow_offline_access: true,
            active: true,
            access_token_lifetime: None,
            access_token_type: AccessTokenType::Jwt,
            refresh_token_usage: RefreshTokenUsage::OneTimeOnly,
            refresh_token_expiration: RefreshTokenExpiration::Absolute,
            absolute_refresh_token_lifetime: 2_592_000,
            sliding_refresh_token_lifetime: 1_296_000,
            require_dpop: false,
            coordinate_lifetime_with_user_session: None,
            allowed_signing_algorithms: vec![],
            jwks: None,
            back_channel_logout_uri: None,
        }
    }

    #[test]
    fn test_grant_type_parse_roundtrip() {
        for value in [
            "authorization_code",
            "client_credentials",
            "refresh_token",
            "password",
            "urn:ietf:params:oauth:grant-type:device_code",
            "urn:openid:params:grant-type:ciba",
        ] {
            assert_eq!(GrantType::parse(value).as_str(), value);
        }
    }

    #[test]
    fn test_grant_type_parse_extension() {
        let parsed = GrantType::parse("urn:example:custom-grant");
        assert_eq!(
            parsed,
            GrantType::Extension("urn:example:custom-grant".to_string())
        );
        assert_eq!(parsed.as_str(), "urn:example:custom-grant");
    }

    #[test]
    fn test_is_grant_type_allowed() {
        let client = test_client();
        assert!(client.is_grant_type_allowed(&GrantType::AuthorizationCode));
        assert!(!client.is_grant_type_allowed(&GrantType::ClientCredentials));
    }

    #[test]
    fn test_is_scope_allowed() {
        let client = test_client();
        assert!(client.is_scope_allowed("openid"));
        assert!(client.is_scope_allowed("api1.read"));
        assert!(!client.is_scope_allowed("api2.write"));
    }

    #[test]
    fn test_offline_access_gated_on_flag() {
        let mut client = test_client();
        assert!(client.is_scope_allowed("offline_access"));

        client.allow_offline_access = false;
        assert!(!client.is_scope_allowed("offline_access"));
    }

    #[test]
    fn test_coordinates_with_session_fallback() {
        let mut client = test_client();
        assert!(!client.coordinates_with_session(false));
        assert!(client.coordinates_with_session(true));

        client.coordinate_lifetime_with_user_session = Some(false);
        assert!(!client.coordinates_with_session(true));
    }
}
