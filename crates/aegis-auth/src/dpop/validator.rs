//! The DPoP proof validator.

use std::collections::HashSet;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, jwk::Jwk};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::AuthResult;
use crate::config::DpopConfig;
use crate::dpop::nonce::DpopNonceService;
use crate::storage::ReplayCache;

/// Replay cache namespace for DPoP proof token ids.
const REPLAY_PURPOSE: &str = "DPoPJwtId";

/// JWK members that only appear on private or symmetric keys.
const PRIVATE_JWK_MEMBERS: &[&str] = &["d", "p", "q", "dp", "dq", "qi", "oth", "k"];

/// The request the proof must be bound to.
///
/// Passed explicitly; the validator has no ambient access to the HTTP
/// request.
#[derive(Debug, Clone)]
pub struct DpopProofContext {
    /// The proof JWT from the `DPoP` header.
    pub proof_token: String,

    /// HTTP method of the request, uppercase.
    pub http_method: String,

    /// Full request URL the proof must name in `htu`.
    pub http_url: String,
}

/// Why a proof was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DpopProofError {
    /// The proof failed header, signature, payload, `iat` freshness, or
    /// replay validation. Maps to `invalid_dpop_proof`.
    InvalidProof(String),

    /// Nonce freshness failed; the client must retry with the fresh nonce
    /// carried in [`DpopProofValidationResult::server_issued_nonce`].
    /// Maps to `use_dpop_nonce`.
    UseNonce,
}

/// Outcome of validating one DPoP proof.
///
/// Carries the validated facts on success and the error state plus any
/// server-issued nonce on failure.
#[derive(Debug, Default)]
pub struct DpopProofValidationResult {
    /// RFC 7638 thumbprint of the embedded public key.
    pub jwk_thumbprint: Option<String>,

    /// The proof's `jti`. Inserted into the replay cache on success.
    pub token_id: Option<String>,

    /// The proof's `iat` (Unix timestamp).
    pub issued_at: Option<i64>,

    /// The nonce the proof presented, if any.
    pub nonce: Option<String>,

    /// Fresh nonce for the client to retry with. Set when nonce freshness
    /// failed; surfaced via the `DPoP-Nonce` response header.
    pub server_issued_nonce: Option<String>,

    /// Error state; `None` means the proof is valid.
    pub error: Option<DpopProofError>,
}

impl DpopProofValidationResult {
    /// Returns `true` if the proof passed every stage.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Converts the error state to an [`crate::error::AuthError`], if any.
    #[must_use]
    pub fn to_auth_error(&self) -> Option<crate::error::AuthError> {
        match &self.error {
            None => None,
            Some(DpopProofError::InvalidProof(message)) => {
                Some(crate::error::AuthError::invalid_dpop_proof(message.clone()))
            }
            Some(DpopProofError::UseNonce) => Some(crate::error::AuthError::UseDpopNonce),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DpopPayload {
    #[serde(default)]
    jti: Option<String>,
    #[serde(default)]
    htm: Option<String>,
    #[serde(default)]
    htu: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    nonce: Option<String>,
}

/// Facts extracted by the header stage and threaded to later stages.
struct ParsedHeader {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    thumbprint: String,
}

enum StageFailure {
    Invalid(String),
    Nonce,
}

/// Validates DPoP proof tokens against a request context.
///
/// Stages run strictly in order — header, signature, payload, freshness —
/// and the replay-cache insert happens last, after everything else
/// succeeded, so a proof that fails early never consumes its `jti`.
pub struct DpopProofValidator {
    config: DpopConfig,
    replay_cache: Arc<dyn ReplayCache>,
    nonce_service: DpopNonceService,
}

impl DpopProofValidator {
    /// Creates a new proof validator.
    #[must_use]
    pub fn new(config: DpopConfig, replay_cache: Arc<dyn ReplayCache>) -> Self {
        let nonce_service = DpopNonceService::new(&config);
        Self {
            config,
            replay_cache,
            nonce_service,
        }
    }

    /// Validates one proof against the request context.
    ///
    /// Domain failures are reported inside the result; the `Err` path is
    /// reserved for infrastructure faults (replay cache unavailable).
    ///
    /// # Errors
    ///
    /// Returns an error if the replay cache or nonce signing fails.
    pub async fn validate(
        &self,
        context: &DpopProofContext,
    ) -> AuthResult<DpopProofValidationResult> {
        let mut result = DpopProofValidationResult::default();

        let header = match self.validate_header(&context.proof_token, &mut result) {
            Ok(header) => header,
            Err(failure) => return self.fail(result, failure),
        };

        let payload = match self.validate_signature(&context.proof_token, &header) {
            Ok(payload) => payload,
            Err(failure) => return self.fail(result, failure),
        };

        if let Err(failure) = self.validate_payload(&payload, context, &mut result) {
            return self.fail(result, failure);
        }

        if let Err(failure) = self.validate_freshness(&result) {
            return self.fail(result, failure);
        }

        // Replay check runs last so proofs failing earlier stages never
        // burn their jti in the replay cache.
        let token_id = result.token_id.clone().unwrap_or_default();
        let expires_at = OffsetDateTime::now_utc() + self.replay_entry_lifetime();
        let first_use = self
            .replay_cache
            .add_if_not_exists(REPLAY_PURPOSE, &token_id, expires_at)
            .await?;
        if !first_use {
            debug!("DPoP proof token replay detected");
            return self.fail(
                result,
                StageFailure::Invalid("Proof token was already used".to_string()),
            );
        }

        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Stage 1: header
    // -------------------------------------------------------------------------

    fn validate_header(
        &self,
        proof_token: &str,
        result: &mut DpopProofValidationResult,
    ) -> Result<ParsedHeader, StageFailure> {
        let mut parts = proof_token.split('.');
        let (Some(header_b64), Some(_), Some(_), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(StageFailure::Invalid(
                "Malformed proof token".to_string(),
            ));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| StageFailure::Invalid("Malformed proof header".to_string()))?;
        let header: Value = serde_json::from_slice(&header_bytes)
            .map_err(|_| StageFailure::Invalid("Malformed proof header".to_string()))?;

        if header.get("typ").and_then(Value::as_str) != Some("dpop+jwt") {
            return Err(StageFailure::Invalid(
                "Proof header typ must be dpop+jwt".to_string(),
            ));
        }

        let alg = header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| StageFailure::Invalid("Proof header missing alg".to_string()))?;
        if !self.config.allowed_algorithms.iter().any(|a| a == alg) {
            return Err(StageFailure::Invalid(format!(
                "Proof algorithm {alg} is not allowed"
            )));
        }
        let algorithm: Algorithm = alg
            .parse()
            .map_err(|_| StageFailure::Invalid(format!("Unknown proof algorithm {alg}")))?;

        let jwk_value = header
            .get("jwk")
            .ok_or_else(|| StageFailure::Invalid("Proof header missing jwk".to_string()))?;
        if !jwk_value.is_object() {
            return Err(StageFailure::Invalid("Proof jwk must be an object".to_string()));
        }
        for member in PRIVATE_JWK_MEMBERS {
            if jwk_value.get(member).is_some() {
                return Err(StageFailure::Invalid(
                    "Proof jwk must be a public asymmetric key".to_string(),
                ));
            }
        }

        let thumbprint = jwk_thumbprint(jwk_value)
            .map_err(|message| StageFailure::Invalid(message.to_string()))?;

        let jwk: Jwk = serde_json::from_value(jwk_value.clone())
            .map_err(|_| StageFailure::Invalid("Unsupported proof jwk".to_string()))?;
        let decoding_key = DecodingKey::from_jwk(&jwk)
            .map_err(|_| StageFailure::Invalid("Unusable proof jwk".to_string()))?;

        result.jwk_thumbprint = Some(thumbprint.clone());

        Ok(ParsedHeader {
            algorithm,
            decoding_key,
            thumbprint,
        })
    }

    // -------------------------------------------------------------------------
    // Stage 2: signature
    // -------------------------------------------------------------------------

    fn validate_signature(
        &self,
        proof_token: &str,
        header: &ParsedHeader,
    ) -> Result<DpopPayload, StageFailure> {
        let mut validation = Validation::new(header.algorithm);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_aud = false;

        let data =
            jsonwebtoken::decode::<DpopPayload>(proof_token, &header.decoding_key, &validation)
                .map_err(|e| {
                    debug!(error = %e, "DPoP proof signature validation failed");
                    StageFailure::Invalid("Proof signature is invalid".to_string())
                })?;

        Ok(data.claims)
    }

    // -------------------------------------------------------------------------
    // Stage 3: payload
    // -------------------------------------------------------------------------

    fn validate_payload(
        &self,
        payload: &DpopPayload,
        context: &DpopProofContext,
        result: &mut DpopProofValidationResult,
    ) -> Result<(), StageFailure> {
        let jti = payload
            .jti
            .as_deref()
            .filter(|jti| !jti.is_empty())
            .ok_or_else(|| StageFailure::Invalid("Proof missing jti".to_string()))?;
        if jti.len() > 512 {
            return Err(StageFailure::Invalid("Proof jti is too long".to_string()));
        }

        match payload.htm.as_deref() {
            Some(htm) if htm == context.http_method => {}
            _ => {
                return Err(StageFailure::Invalid(
                    "Proof htm does not match the request method".to_string(),
                ));
            }
        }

        match payload.htu.as_deref() {
            Some(htu) if htu == context.http_url => {}
            _ => {
                return Err(StageFailure::Invalid(
                    "Proof htu does not match the request URL".to_string(),
                ));
            }
        }

        let iat = payload
            .iat
            .ok_or_else(|| StageFailure::Invalid("Proof missing iat".to_string()))?;

        result.token_id = Some(jti.to_string());
        result.issued_at = Some(iat);
        result.nonce = payload.nonce.clone();

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Stage 4: freshness (replay happens in `validate`, after this)
    // -------------------------------------------------------------------------

    fn validate_freshness(&self, result: &DpopProofValidationResult) -> Result<(), StageFailure> {
        if self.config.validate_iat {
            self.validate_iat_freshness(result)?;
        }
        if self.config.validate_nonce {
            self.validate_nonce_freshness(result)?;
        }
        Ok(())
    }

    fn validate_iat_freshness(
        &self,
        result: &DpopProofValidationResult,
    ) -> Result<(), StageFailure> {
        let iat = result
            .issued_at
            .expect("payload stage guarantees iat is present");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let skew = self.config.clock_skew.as_secs() as i64;
        let lifetime = self.config.proof_lifetime.as_secs() as i64;

        if iat > now + skew {
            return Err(StageFailure::Invalid(
                "Proof iat is in the future".to_string(),
            ));
        }
        if iat + lifetime + skew < now {
            return Err(StageFailure::Invalid("Proof is too old".to_string()));
        }

        Ok(())
    }

    fn validate_nonce_freshness(
        &self,
        result: &DpopProofValidationResult,
    ) -> Result<(), StageFailure> {
        match result.nonce.as_deref() {
            Some(nonce) if self.nonce_service.is_valid(nonce) => Ok(()),
            _ => Err(StageFailure::Nonce),
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn replay_entry_lifetime(&self) -> Duration {
        let mut secs = self.config.proof_lifetime.as_secs() + self.config.clock_skew.as_secs();
        if self.config.validate_nonce {
            secs += self.config.nonce_lifetime.as_secs();
        }
        Duration::seconds(secs as i64)
    }

    fn fail(
        &self,
        mut result: DpopProofValidationResult,
        failure: StageFailure,
    ) -> AuthResult<DpopProofValidationResult> {
        match failure {
            StageFailure::Invalid(message) => {
                debug!(message, "DPoP proof rejected");
                result.error = Some(DpopProofError::InvalidProof(message));
            }
            StageFailure::Nonce => {
                result.server_issued_nonce = Some(self.nonce_service.issue()?);
                result.error = Some(DpopProofError::UseNonce);
            }
        }
        Ok(result)
    }
}

/// Computes the RFC 7638 thumbprint of a public JWK.
///
/// The canonical form orders the required members lexicographically and
/// contains nothing else.
fn jwk_thumbprint(jwk: &Value) -> Result<String, &'static str> {
    let get = |member: &str| -> Result<&str, &'static str> {
        jwk.get(member)
            .and_then(Value::as_str)
            .ok_or("Proof jwk is missing a required member")
    };

    let canonical = match get("kty")? {
        "RSA" => format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, get("e")?, get("n")?),
        "EC" => format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            get("crv")?,
            get("x")?,
            get("y")?
        ),
        "OKP" => format!(
            r#"{{"crv":"{}","kty":"OKP","x":"{}"}}"#,
            get("crv")?,
            get("x")?
        ),
        _ => return Err("Unsupported proof jwk key type"),
    };

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthResult;
    use async_trait::async_trait;
    use jsonwebtoken::{EncodingKey, Header};
    use rand::rngs::OsRng;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::traits::PublicKeyParts;
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    struct TestReplayCache {
        entries: Mutex<HashMap<String, OffsetDateTime>>,
    }

    impl TestReplayCache {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
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

    struct ProofKey {
        encoding_key: EncodingKey,
        jwk: Value,
    }

    fn generate_proof_key() -> ProofKey {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        let jwk = json!({
            "kty": "RSA",
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        });
        ProofKey { encoding_key, jwk }
    }

    fn build_proof(key: &ProofKey, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("dpop+jwt".to_string());
        header.jwk = Some(serde_json::from_value(key.jwk.clone()).unwrap());
        jsonwebtoken::encode(&header, claims, &key.encoding_key).unwrap()
    }

    fn proof_claims(jti: &str) -> Value {
        json!({
            "jti": jti,
            "htm": "POST",
            "htu": "https://id.example.com/connect/token",
            "iat": OffsetDateTime::now_utc().unix_timestamp(),
        })
    }

    fn context(proof_token: String) -> DpopProofContext {
        DpopProofContext {
            proof_token,
            http_method: "POST".to_string(),
            http_url: "https://id.example.com/connect/token".to_string(),
        }
    }

    fn validator(config: DpopConfig) -> DpopProofValidator {
        DpopProofValidator::new(config, Arc::new(TestReplayCache::new()))
    }

    #[tokio::test]
    async fn test_valid_proof() {
        let key = generate_proof_key();
        let validator = validator(DpopConfig::default());

        let proof = build_proof(&key, &proof_claims("jti-1"));
        let result = validator.validate(&context(proof)).await.unwrap();

        assert!(result.is_valid(), "{:?}", result.error);
        assert_eq!(result.token_id.as_deref(), Some("jti-1"));
        assert!(result.jwk_thumbprint.is_some());
        assert!(result.issued_at.is_some());
    }

    #[tokio::test]
    async fn test_wrong_typ_rejected() {
        let key = generate_proof_key();
        let validator = validator(DpopConfig::default());

        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.jwk = Some(serde_json::from_value(key.jwk.clone()).unwrap());
        let proof =
            jsonwebtoken::encode(&header, &proof_claims("jti-2"), &key.encoding_key).unwrap();

        let result = validator.validate(&context(proof)).await.unwrap();
        assert!(matches!(result.error, Some(DpopProofError::InvalidProof(_))));
    }

    #[tokio::test]
    async fn test_missing_jwk_rejected() {
        let key = generate_proof_key();
        let validator = validator(DpopConfig::default());

        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("dpop+jwt".to_string());
        let proof =
            jsonwebtoken::encode(&header, &proof_claims("jti-3"), &key.encoding_key).unwrap();

        let result = validator.validate(&context(proof)).await.unwrap();
        assert!(matches!(result.error, Some(DpopProofError::InvalidProof(_))));
    }

    #[tokio::test]
    async fn test_htu_mismatch_rejected() {
        let key = generate_proof_key();
        let validator = validator(DpopConfig::default());

        let claims = json!({
            "jti": "jti-4",
            "htm": "POST",
            "htu": "https://other.example.com/token",
            "iat": OffsetDateTime::now_utc().unix_timestamp(),
        });
        let proof = build_proof(&key, &claims);

        let result = validator.validate(&context(proof)).await.unwrap();
        assert!(matches!(result.error, Some(DpopProofError::InvalidProof(_))));
    }

    #[tokio::test]
    async fn test_stale_iat_rejected() {
        let key = generate_proof_key();
        let validator = validator(DpopConfig::default());

        let claims = json!({
            "jti": "jti-5",
            "htm": "POST",
            "htu": "https://id.example.com/connect/token",
            "iat": OffsetDateTime::now_utc().unix_timestamp() - 3600,
        });
        let proof = build_proof(&key, &claims);

        let result = validator.validate(&context(proof)).await.unwrap();
        assert!(matches!(result.error, Some(DpopProofError::InvalidProof(_))));
    }

    #[tokio::test]
    async fn test_replay_rejected_on_second_presentation() {
        let key = generate_proof_key();
        let validator = validator(DpopConfig::default());

        let proof = build_proof(&key, &proof_claims("jti-replay"));

        let first = validator.validate(&context(proof.clone())).await.unwrap();
        assert!(first.is_valid());

        let second = validator.validate(&context(proof)).await.unwrap();
        assert!(matches!(second.error, Some(DpopProofError::InvalidProof(_))));
    }

    #[tokio::test]
    async fn test_failed_stage_does_not_burn_jti() {
        let key = generate_proof_key();
        let validator = validator(DpopConfig::default());

        // Same jti: first presented with a wrong htu (fails payload stage),
        // then with the right one. The second must still succeed.
        let bad = json!({
            "jti": "jti-burned",
            "htm": "POST",
            "htu": "https://wrong.example.com/token",
            "iat": OffsetDateTime::now_utc().unix_timestamp(),
        });
        let result = validator
            .validate(&context(build_proof(&key, &bad)))
            .await
            .unwrap();
        assert!(!result.is_valid());

        let good = build_proof(&key, &proof_claims("jti-burned"));
        let result = validator.validate(&context(good)).await.unwrap();
        assert!(result.is_valid(), "{:?}", result.error);
    }

    #[tokio::test]
    async fn test_nonce_mode_issues_fresh_nonce() {
        let key = generate_proof_key();
        let config = DpopConfig {
            validate_nonce: true,
            validate_iat: false,
            ..DpopConfig::default()
        };
        let validator = DpopProofValidator::new(config, Arc::new(TestReplayCache::new()));

        // No nonce on the first proof: rejected with a fresh nonce.
        let result = validator
            .validate(&context(build_proof(&key, &proof_claims("jti-n1"))))
            .await
            .unwrap();
        assert_eq!(result.error, Some(DpopProofError::UseNonce));
        let nonce = result.server_issued_nonce.expect("nonce must be issued");

        // Retry with the issued nonce: accepted.
        let claims = json!({
            "jti": "jti-n2",
            "htm": "POST",
            "htu": "https://id.example.com/connect/token",
            "iat": OffsetDateTime::now_utc().unix_timestamp(),
            "nonce": nonce,
        });
        let result = validator
            .validate(&context(build_proof(&key, &claims)))
            .await
            .unwrap();
        assert!(result.is_valid(), "{:?}", result.error);
    }

    #[tokio::test]
    async fn test_disallowed_algorithm_rejected() {
        let key = generate_proof_key();
        let config = DpopConfig {
            allowed_algorithms: vec!["ES256".to_string()],
            ..DpopConfig::default()
        };
        let validator = DpopProofValidator::new(config, Arc::new(TestReplayCache::new()));

        let result = validator
            .validate(&context(build_proof(&key, &proof_claims("jti-alg"))))
            .await
            .unwrap();
        assert!(matches!(result.error, Some(DpopProofError::InvalidProof(_))));
    }

    #[test]
    fn test_jwk_thumbprint_rfc7638_vector() {
        // Test vector from RFC 7638 section 3.1.
        let jwk = json!({
            "kty": "RSA",
            "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
            "e": "AQAB",
            "alg": "RS256",
            "kid": "2011-04-29"
        });
        assert_eq!(
            jwk_thumbprint(&jwk).unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn test_jwk_thumbprint_rejects_symmetric() {
        let jwk = json!({"kty": "oct", "k": "secret"});
        assert!(jwk_thumbprint(&jwk).is_err());
    }
}
