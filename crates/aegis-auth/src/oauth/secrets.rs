//! Client secret and proof validators.
//!
//! Three ways a client proves its identity at the token endpoint:
//!
//! - Shared secret, compared constant-time against stored SHA-256 digests
//! - `private_key_jwt` client assertion per RFC 7523, verified against the
//!   client's registered JWKS with single-use `jti` enforcement
//! - X.509 certificate thumbprint (`x5t#S256`) from the mTLS layer
//!
//! # Security Considerations
//!
//! - Assertion `jti` values are tracked through the replay cache
//! - Assertion lifetime is bounded (default 5 minutes)
//! - Secret comparisons never short-circuit on the first mismatching byte

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::ReplayCache;
use crate::types::secret::{ParsedSecret, SecretType, constant_time_eq, hash_shared_secret};
use crate::types::Client;

/// Replay cache namespace for client assertion token ids.
const ASSERTION_REPLAY_PURPOSE: &str = "ClientAssertionJwtId";

/// Assertion algorithms accepted for `private_key_jwt`.
const ASSERTION_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::PS256,
    Algorithm::ES256,
    Algorithm::ES384,
];

// =============================================================================
// Shared secret
// =============================================================================

/// Validates plaintext shared secrets against a client's stored digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedSecretValidator;

impl SharedSecretValidator {
    /// Validates a presented shared secret.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidClient` if no registered, unexpired
    /// shared secret matches.
    pub fn validate(&self, parsed: &ParsedSecret, client: &Client) -> AuthResult<()> {
        if parsed.secret_type != SecretType::SharedSecret {
            return Err(AuthError::invalid_client("Not a shared secret credential"));
        }

        let presented_hash = hash_shared_secret(&parsed.credential);
        let matched = client
            .secrets
            .iter()
            .filter(|secret| secret.secret_type == SecretType::SharedSecret)
            .filter(|secret| !secret.is_expired())
            .any(|secret| constant_time_eq(&secret.value, &presented_hash));

        if matched {
            Ok(())
        } else {
            debug!(client_id = %client.client_id, "Shared secret mismatch");
            Err(AuthError::invalid_client("Invalid client secret"))
        }
    }
}

// =============================================================================
// X.509 thumbprint
// =============================================================================

/// Validates an mTLS certificate thumbprint against registered secrets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbprintSecretValidator;

impl ThumbprintSecretValidator {
    /// Validates a presented `x5t#S256` thumbprint.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidClient` if no registered, unexpired
    /// thumbprint secret matches.
    pub fn validate(&self, parsed: &ParsedSecret, client: &Client) -> AuthResult<()> {
        if parsed.secret_type != SecretType::X509Thumbprint {
            return Err(AuthError::invalid_client("Not a thumbprint credential"));
        }

        let matched = client
            .secrets
            .iter()
            .filter(|secret| secret.secret_type == SecretType::X509Thumbprint)
            .filter(|secret| !secret.is_expired())
            .any(|secret| constant_time_eq(&secret.value, &parsed.credential));

        if matched {
            Ok(())
        } else {
            debug!(client_id = %client.client_id, "Certificate thumbprint mismatch");
            Err(AuthError::invalid_client("Unknown client certificate"))
        }
    }
}

// =============================================================================
// private_key_jwt
// =============================================================================

/// JWT claims for client assertions per RFC 7523.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Issuer - must be the client_id.
    pub iss: String,

    /// Subject - must be the client_id.
    pub sub: String,

    /// Audience - must contain the token endpoint URL.
    pub aud: StringOrArray,

    /// Expiration time as Unix timestamp.
    pub exp: i64,

    /// JWT ID - single-use to prevent replay.
    pub jti: String,

    /// Issued at time (optional but recommended).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Audience claim: a single string or an array of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrArray {
    /// Single string audience.
    String(String),
    /// Array of audience strings.
    Array(Vec<String>),
}

impl StringOrArray {
    /// Checks if the audience contains the specified value.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::String(s) => s == value,
            Self::Array(arr) => arr.iter().any(|s| s == value),
        }
    }
}

/// Validates `private_key_jwt` client assertions.
pub struct PrivateKeyJwtValidator {
    token_endpoint: String,
    max_lifetime_secs: i64,
    replay_cache: Arc<dyn ReplayCache>,
}

impl PrivateKeyJwtValidator {
    /// Creates a new validator.
    ///
    /// # Arguments
    ///
    /// * `token_endpoint` - Expected audience of assertions
    /// * `replay_cache` - Replay cache for `jti` single-use enforcement
    #[must_use]
    pub fn new(token_endpoint: impl Into<String>, replay_cache: Arc<dyn ReplayCache>) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            max_lifetime_secs: 300, // 5 minutes per spec
            replay_cache,
        }
    }

    /// Sets the maximum assertion lifetime in seconds.
    #[must_use]
    pub fn with_max_lifetime(mut self, seconds: i64) -> Self {
        self.max_lifetime_secs = seconds;
        self
    }

    /// Validates a client assertion JWT.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidClient` if:
    /// - The client has no registered JWKS
    /// - The signature doesn't verify against any registered key
    /// - `iss` or `sub` doesn't match the client id
    /// - `aud` doesn't contain the token endpoint
    /// - The assertion is expired or its lifetime exceeds the maximum
    /// - The `jti` was already used (replay)
    pub async fn validate(
        &self,
        parsed: &ParsedSecret,
        client: &Client,
    ) -> AuthResult<ClientAssertionClaims> {
        if parsed.secret_type != SecretType::JwtBearer {
            return Err(AuthError::invalid_client("Not a client assertion credential"));
        }

        let jwks = client
            .jwks
            .as_ref()
            .ok_or_else(|| AuthError::invalid_client("Client has no registered JWKS"))?;

        // 1. Pick candidate keys: by kid when the header names one,
        //    otherwise every registered key.
        let header = jsonwebtoken::decode_header(&parsed.credential)
            .map_err(|_| AuthError::invalid_client("Malformed client assertion"))?;
        if !ASSERTION_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::invalid_client(
                "Client assertion algorithm not allowed",
            ));
        }

        let candidates: Vec<_> = match header.kid.as_deref() {
            Some(kid) => jwks
                .keys
                .iter()
                .filter(|jwk| jwk.common.key_id.as_deref() == Some(kid))
                .collect(),
            None => jwks.keys.iter().collect(),
        };
        if candidates.is_empty() {
            return Err(AuthError::invalid_client(
                "No registered key matches the assertion",
            ));
        }

        // 2. Build validation with audience and issuer checks.
        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.token_endpoint]);
        validation.set_issuer(&[&client.client_id]);
        validation.required_spec_claims =
            HashSet::from(["exp".to_string(), "iss".to_string(), "aud".to_string()]);

        // 3. Verify the signature against the candidate keys.
        let mut claims = None;
        for jwk in candidates {
            let Ok(decoding_key) = DecodingKey::from_jwk(jwk) else {
                continue;
            };
            if let Ok(data) = jsonwebtoken::decode::<ClientAssertionClaims>(
                &parsed.credential,
                &decoding_key,
                &validation,
            ) {
                claims = Some(data.claims);
                break;
            }
        }
        let claims = claims.ok_or_else(|| {
            debug!(client_id = %client.client_id, "Client assertion verification failed");
            AuthError::invalid_client("Invalid client assertion")
        })?;

        // 4. Subject must also be the client id.
        if claims.sub != client.client_id {
            return Err(AuthError::invalid_client(
                "Assertion subject does not match client",
            ));
        }

        // 5. Bound the assertion lifetime.
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if claims.exp > now + self.max_lifetime_secs {
            return Err(AuthError::invalid_client(
                "Assertion expiration exceeds maximum lifetime",
            ));
        }

        // 6. jti single-use.
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|_| AuthError::invalid_client("Assertion exp is out of range"))?;
        let first_use = self
            .replay_cache
            .add_if_not_exists(ASSERTION_REPLAY_PURPOSE, &claims.jti, expires_at)
            .await?;
        if !first_use {
            debug!(client_id = %client.client_id, "Client assertion replay detected");
            return Err(AuthError::invalid_client("Assertion was already used"));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::secret::ClientSecret;
    use crate::types::{AccessTokenType, RefreshTokenExpiration, RefreshTokenUsage};
    use crate::types::client::GrantType;
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use jsonwebtoken::{EncodingKey, Header};
    use rand::rngs::OsRng;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::traits::PublicKeyParts;
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct TestReplayCache {
        entries: Mutex<HashMap<String, OffsetDateTime>>,
    }

    #[async_trait]
    impl ReplayCache for TestReplayCache {
        async fn add_if_not_exists(
            &self,
            purpose: &str,
            handle: &str,
            expires_at: OffsetDateTime,
        ) -> AuthResult<bool> {
            let mut entries = self.entries.lock().unwrap();
            let key = format!("{purpose}:{handle}");
            if entries.contains_key(&key) {
                return Ok(false);
            }
            entries.insert(key, expires_at);
            Ok(true)
        }

        async fn cleanup_expired(&self) -> AuthResult<u64> {
            Ok(0)
        }
    }

    fn replay_cache() -> Arc<TestReplayCache> {
        Arc::new(TestReplayCache {
            entries: Mutex::new(HashMap::new()),
        })
    }

    fn client_with_secrets(secrets: Vec<ClientSecret>) -> Client {
        Client {
            client_id: "backend".to_string(),
            protocol_type: "oidc".to_string(),
            secrets,
            name: "Backend".to_string(),
            grant_types: vec![GrantType::ClientCredentials],
            allowed_scopes: vec!["api1.read".to_string()],
            allow_offline_access: false,
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
    fn test_shared_secret_valid() {
        let client = client_with_secrets(vec![ClientSecret::shared("correct horse")]);
        let parsed = ParsedSecret {
            id: "backend".to_string(),
            credential: "correct horse".to_string(),
            secret_type: SecretType::SharedSecret,
        };
        assert!(SharedSecretValidator.validate(&parsed, &client).is_ok());
    }

    #[test]
    fn test_shared_secret_wrong_value() {
        let client = client_with_secrets(vec![ClientSecret::shared("correct horse")]);
        let parsed = ParsedSecret {
            id: "backend".to_string(),
            credential: "battery staple".to_string(),
            secret_type: SecretType::SharedSecret,
        };
        assert!(matches!(
            SharedSecretValidator.validate(&parsed, &client),
            Err(AuthError::InvalidClient { .. })
        ));
    }

    #[test]
    fn test_shared_secret_expired() {
        let expired = ClientSecret::shared("correct horse")
            .with_expiration(OffsetDateTime::now_utc() - time::Duration::minutes(1));
        let client = client_with_secrets(vec![expired]);
        let parsed = ParsedSecret {
            id: "backend".to_string(),
            credential: "correct horse".to_string(),
            secret_type: SecretType::SharedSecret,
        };
        assert!(SharedSecretValidator.validate(&parsed, &client).is_err());
    }

    #[test]
    fn test_thumbprint_match() {
        let client =
            client_with_secrets(vec![ClientSecret::thumbprint("AAAbbbCCC123")]);
        let parsed = ParsedSecret {
            id: "backend".to_string(),
            credential: "AAAbbbCCC123".to_string(),
            secret_type: SecretType::X509Thumbprint,
        };
        assert!(ThumbprintSecretValidator.validate(&parsed, &client).is_ok());

        let wrong = ParsedSecret {
            id: "backend".to_string(),
            credential: "differentprint".to_string(),
            secret_type: SecretType::X509Thumbprint,
        };
        assert!(ThumbprintSecretValidator.validate(&wrong, &client).is_err());
    }

    // -------------------------------------------------------------------------
    // private_key_jwt
    // -------------------------------------------------------------------------

    const TOKEN_ENDPOINT: &str = "https://id.example.com/connect/token";

    struct AssertionKey {
        encoding_key: EncodingKey,
        jwk_set: jsonwebtoken::jwk::JwkSet,
    }

    fn generate_assertion_key(kid: &str) -> AssertionKey {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let jwk = serde_json::json!({
            "kty": "RSA",
            "kid": kid,
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        });
        AssertionKey {
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
            jwk_set: serde_json::from_value(serde_json::json!({"keys": [jwk]})).unwrap(),
        }
    }

    fn build_assertion(key: &AssertionKey, kid: &str, claims: &ClientAssertionClaims) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        jsonwebtoken::encode(&header, claims, &key.encoding_key).unwrap()
    }

    fn assertion_claims(client_id: &str, jti: &str) -> ClientAssertionClaims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        ClientAssertionClaims {
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            aud: StringOrArray::String(TOKEN_ENDPOINT.to_string()),
            exp: now + 120,
            jti: jti.to_string(),
            iat: Some(now),
        }
    }

    fn parsed_assertion(client_id: &str, assertion: String) -> ParsedSecret {
        ParsedSecret {
            id: client_id.to_string(),
            credential: assertion,
            secret_type: SecretType::JwtBearer,
        }
    }

    #[tokio::test]
    async fn test_assertion_valid() {
        let key = generate_assertion_key("k1");
        let mut client = client_with_secrets(vec![]);
        client.jwks = Some(key.jwk_set.clone());

        let validator = PrivateKeyJwtValidator::new(TOKEN_ENDPOINT, replay_cache());
        let assertion = build_assertion(&key, "k1", &assertion_claims("backend", "jti-a"));

        let claims = validator
            .validate(&parsed_assertion("backend", assertion), &client)
            .await
            .unwrap();
        assert_eq!(claims.iss, "backend");
        assert_eq!(claims.jti, "jti-a");
    }

    #[tokio::test]
    async fn test_assertion_replay_rejected() {
        let key = generate_assertion_key("k1");
        let mut client = client_with_secrets(vec![]);
        client.jwks = Some(key.jwk_set.clone());

        let validator = PrivateKeyJwtValidator::new(TOKEN_ENDPOINT, replay_cache());
        let assertion = build_assertion(&key, "k1", &assertion_claims("backend", "jti-b"));

        assert!(
            validator
                .validate(&parsed_assertion("backend", assertion.clone()), &client)
                .await
                .is_ok()
        );
        assert!(matches!(
            validator
                .validate(&parsed_assertion("backend", assertion), &client)
                .await,
            Err(AuthError::InvalidClient { .. })
        ));
    }

    #[tokio::test]
    async fn test_assertion_wrong_audience() {
        let key = generate_assertion_key("k1");
        let mut client = client_with_secrets(vec![]);
        client.jwks = Some(key.jwk_set.clone());

        let validator = PrivateKeyJwtValidator::new(TOKEN_ENDPOINT, replay_cache());
        let mut claims = assertion_claims("backend", "jti-c");
        claims.aud = StringOrArray::String("https://other.example.com/token".to_string());
        let assertion = build_assertion(&key, "k1", &claims);

        assert!(
            validator
                .validate(&parsed_assertion("backend", assertion), &client)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_assertion_lifetime_bounded() {
        let key = generate_assertion_key("k1");
        let mut client = client_with_secrets(vec![]);
        client.jwks = Some(key.jwk_set.clone());

        let validator = PrivateKeyJwtValidator::new(TOKEN_ENDPOINT, replay_cache());
        let mut claims = assertion_claims("backend", "jti-d");
        claims.exp = OffsetDateTime::now_utc().unix_timestamp() + 3600; // over 5 minutes
        let assertion = build_assertion(&key, "k1", &claims);

        assert!(
            validator
                .validate(&parsed_assertion("backend", assertion), &client)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_assertion_no_jwks() {
        let key = generate_assertion_key("k1");
        let client = client_with_secrets(vec![]);

        let validator = PrivateKeyJwtValidator::new(TOKEN_ENDPOINT, replay_cache());
        let assertion = build_assertion(&key, "k1", &assertion_claims("backend", "jti-e"));

        assert!(matches!(
            validator
                .validate(&parsed_assertion("backend", assertion), &client)
                .await,
            Err(AuthError::InvalidClient { .. })
        ));
    }

    #[tokio::test]
    async fn test_assertion_sub_mismatch() {
        let key = generate_assertion_key("k1");
        let mut client = client_with_secrets(vec![]);
        client.jwks = Some(key.jwk_set.clone());

        let validator = PrivateKeyJwtValidator::new(TOKEN_ENDPOINT, replay_cache());
        let mut claims = assertion_claims("backend", "jti-f");
        claims.sub = "someone-else".to_string();
        let assertion = build_assertion(&key, "k1", &claims);

        assert!(
            validator
                .validate(&parsed_assertion("backend", assertion), &client)
                .await
                .is_err()
        );
    }
}
