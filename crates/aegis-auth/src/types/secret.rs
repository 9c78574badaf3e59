//! Client secret types.
//!
//! Registered secrets are stored hashed (shared secrets) or as reference
//! values (X.509 thumbprints); the plaintext credential presented on a
//! request is modeled separately as [`ParsedSecret`].

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The kind of secret a client registered or presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    /// Shared secret, stored as a SHA-256 digest.
    SharedSecret,
    /// X.509 certificate SHA-256 thumbprint (`x5t#S256`).
    X509Thumbprint,
    /// JWT bearer client assertion (`private_key_jwt`), verified against
    /// the client's registered JWKS.
    JwtBearer,
}

/// A secret registered on a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecret {
    /// The stored secret value. For `SharedSecret` this is a hex SHA-256
    /// digest of the plaintext; for `X509Thumbprint` the base64url
    /// thumbprint itself.
    pub value: String,

    /// The secret kind.
    pub secret_type: SecretType,

    /// Optional expiration; expired secrets never validate.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expiration: Option<OffsetDateTime>,
}

impl ClientSecret {
    /// Creates a shared secret entry from a plaintext value, hashing it.
    #[must_use]
    pub fn shared(plaintext: &str) -> Self {
        Self {
            value: hash_shared_secret(plaintext),
            secret_type: SecretType::SharedSecret,
            expiration: None,
        }
    }

    /// Creates an X.509 thumbprint entry.
    #[must_use]
    pub fn thumbprint(x5t_s256: impl Into<String>) -> Self {
        Self {
            value: x5t_s256.into(),
            secret_type: SecretType::X509Thumbprint,
            expiration: None,
        }
    }

    /// Sets an expiration on the secret.
    #[must_use]
    pub fn with_expiration(mut self, expiration: OffsetDateTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Returns `true` if the secret has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiration
            .map(|exp| OffsetDateTime::now_utc() > exp)
            .unwrap_or(false)
    }
}

/// A credential presented by a client on a request, before validation.
#[derive(Debug, Clone)]
pub struct ParsedSecret {
    /// The client id the credential claims to belong to.
    pub id: String,

    /// The raw credential: plaintext shared secret, assertion JWT,
    /// or certificate thumbprint, depending on `secret_type`.
    pub credential: String,

    /// How the credential was presented.
    pub secret_type: SecretType,
}

/// Hashes a plaintext shared secret for storage or comparison.
#[must_use]
pub fn hash_shared_secret(plaintext: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality over two strings.
///
/// Compares every byte regardless of where the first mismatch occurs, so
/// the comparison time does not leak the matching prefix length.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
