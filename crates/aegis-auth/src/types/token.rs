//! Pre-serialization token model.
//!
//! A [`Token`] is the abstract result of a validated request: claims,
//! audiences, lifetime, and proof-of-possession confirmation, before any
//! signing or serialization happens. It is immutable once handed to the
//! token creation service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::client::AccessTokenType;

/// Kind of token being minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// OIDC identity token.
    Identity,
    /// OAuth access token.
    Access,
}

/// Proof-of-possession mechanism bound to a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofType {
    /// mTLS client certificate binding.
    ClientCertificate,
    /// DPoP key binding (RFC 9449).
    Dpop,
}

/// Proof-of-possession confirmation, serialized as the `cnf` claim
/// (RFC 7800).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// DPoP JWK thumbprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jkt: Option<String>,

    /// X.509 certificate SHA-256 thumbprint.
    #[serde(rename = "x5t#S256", skip_serializing_if = "Option::is_none")]
    pub x5t_s256: Option<String>,
}

impl Confirmation {
    /// Confirmation from a DPoP key thumbprint.
    #[must_use]
    pub fn dpop(jkt: impl Into<String>) -> Self {
        Self {
            jkt: Some(jkt.into()),
            x5t_s256: None,
        }
    }

    /// Confirmation from an mTLS certificate thumbprint.
    #[must_use]
    pub fn certificate(x5t_s256: impl Into<String>) -> Self {
        Self {
            jkt: None,
            x5t_s256: Some(x5t_s256.into()),
        }
    }

    /// Returns `true` if no binding is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jkt.is_none() && self.x5t_s256.is_none()
    }
}

/// An abstract token, ready for signing/serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Identity or access token.
    pub token_type: TokenType,

    /// Issuer URL (`iss`).
    pub issuer: String,

    /// Audiences (`aud`).
    pub audiences: Vec<String>,

    /// Subject (`sub`), absent for pure machine tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// Client the token is issued to (`client_id`).
    pub client_id: String,

    /// Server-side session id (`sid`), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Granted scopes (`scope`).
    pub scopes: Vec<String>,

    /// Proof-of-possession confirmation (`cnf`), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,

    /// Additional claims merged into the payload.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_claims: Map<String, Value>,

    /// Lifetime in seconds.
    pub lifetime_secs: u64,

    /// JWS algorithms acceptable to the addressed resources.
    /// Empty means any configured server algorithm.
    #[serde(default)]
    pub allowed_signing_algorithms: Vec<String>,

    /// Whether this access token is serialized as a JWT or stored as a
    /// reference handle. Ignored for identity tokens.
    #[serde(default)]
    pub access_token_type: AccessTokenType,
}

impl Token {
    /// Space-joined scope claim value.
    #[must_use]
    pub fn scope_claim(&self) -> String {
        self.scopes.join(" ")
    }
}
