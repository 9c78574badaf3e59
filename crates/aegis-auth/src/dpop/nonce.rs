//! Server-issued DPoP nonces.
//!
//! Nonces are self-contained: an HS256-signed issued-at/expiry pair bound
//! to the server's nonce secret. Validation needs no storage round-trip,
//! and a nonce from another deployment never verifies.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::DpopConfig;
use crate::error::AuthError;

#[derive(Debug, Serialize, Deserialize)]
struct NonceClaims {
    iat: i64,
    exp: i64,
}

/// Issues and checks opaque encrypted-timestamp nonces.
pub struct DpopNonceService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime_secs: i64,
    clock_skew_secs: i64,
}

impl DpopNonceService {
    /// Creates a nonce service from the DPoP configuration.
    #[must_use]
    pub fn new(config: &DpopConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.nonce_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.nonce_secret.as_bytes()),
            lifetime_secs: config.nonce_lifetime.as_secs() as i64,
            clock_skew_secs: config.clock_skew.as_secs() as i64,
        }
    }

    /// Issues a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = NonceClaims {
            iat: now,
            exp: now + self.lifetime_secs,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("Nonce signing failed: {e}")))
    }

    /// Returns `true` if the nonce was issued by this server and is still
    /// inside its validity window.
    #[must_use]
    pub fn is_valid(&self, nonce: &str) -> bool {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.clock_skew_secs as u64;

        match jsonwebtoken::decode::<NonceClaims>(nonce, &self.decoding_key, &validation) {
            Ok(data) => {
                // Reject nonces claiming to come from the future.
                let now = OffsetDateTime::now_utc().unix_timestamp();
                data.claims.iat <= now + self.clock_skew_secs
            }
            Err(_) => false,
        }
    }
}
