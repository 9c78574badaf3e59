//! Signing key material.
//!
//! The [`KeyMaterialService`] trait abstracts rotating key material: one
//! current signing key per request (honoring the request's algorithm
//! allow-list) and the full set of validation keys so tokens signed by
//! previous generations keep validating.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;

/// A signing key generation.
pub struct SigningKey {
    /// Key ID, emitted as the JWS `kid` header.
    pub kid: String,

    /// The JWS algorithm this key signs with.
    pub algorithm: Algorithm,

    /// Private key for signing.
    pub encoding_key: EncodingKey,

    /// Public key for verification.
    pub decoding_key: DecodingKey,

    /// When the key was created. Newest wins for signing.
    pub created_at: OffsetDateTime,
}

impl SigningKey {
    /// Generates a fresh 2048-bit RSA key for the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or PEM export fails, or the
    /// algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: Algorithm) -> AuthResult<Self> {
        if !matches!(
            algorithm,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 | Algorithm::PS256
        ) {
            return Err(AuthError::configuration(format!(
                "Algorithm {algorithm:?} is not RSA-based"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| AuthError::internal(format!("RSA key generation failed: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::internal(format!("Private key export failed: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::internal(format!("Invalid generated private key: {e}")))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::internal(format!("Public key export failed: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AuthError::internal(format!("Invalid generated public key: {e}")))?;

        Ok(Self {
            kid: Uuid::new_v4().to_string(),
            algorithm,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// The algorithm as its JWS string name.
    #[must_use]
    pub fn algorithm_name(&self) -> &'static str {
        algorithm_name(self.algorithm)
    }
}

/// JWS string name for an algorithm.
#[must_use]
pub fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// Access to rotating signing key material.
#[async_trait]
pub trait KeyMaterialService: Send + Sync {
    /// Returns the current signing key, restricted to the given algorithm
    /// allow-list. An empty list accepts any configured algorithm.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no key satisfies the allow-list.
    async fn get_signing_key(&self, allowed_algorithms: &[String]) -> AuthResult<Arc<SigningKey>>;

    /// Returns every key acceptable for validating inbound tokens,
    /// current and previous generations alike.
    ///
    /// # Errors
    ///
    /// Returns an error if key material cannot be loaded.
    async fn get_validation_keys(&self) -> AuthResult<Vec<Arc<SigningKey>>>;
}

/// In-memory key material holding one or more key generations.
pub struct InMemoryKeyMaterial {
    keys: RwLock<Vec<Arc<SigningKey>>>,
}

impl InMemoryKeyMaterial {
    /// Creates key material with a single fresh RS256 key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn new() -> AuthResult<Self> {
        let key = SigningKey::generate_rsa(Algorithm::RS256)?;
        Ok(Self {
            keys: RwLock::new(vec![Arc::new(key)]),
        })
    }

    /// Adds a new key generation. The newest key becomes the signing key;
    /// older generations stay valid for validation.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn rotate(&self, algorithm: Algorithm) -> AuthResult<()> {
        let key = SigningKey::generate_rsa(algorithm)?;
        self.keys
            .write()
            .expect("key material lock poisoned")
            .push(Arc::new(key));
        Ok(())
    }
}

#[async_trait]
impl KeyMaterialService for InMemoryKeyMaterial {
    async fn get_signing_key(&self, allowed_algorithms: &[String]) -> AuthResult<Arc<SigningKey>> {
        let keys = self.keys.read().expect("key material lock poisoned");
        keys.iter()
            .filter(|key| {
                allowed_algorithms.is_empty()
                    || allowed_algorithms
                        .iter()
                        .any(|alg| alg == key.algorithm_name())
            })
            .max_by_key(|key| key.created_at)
            .cloned()
            .ok_or_else(|| {
                AuthError::configuration(format!(
                    "No signing key satisfies algorithm allow-list {allowed_algorithms:?}"
                ))
            })
    }

    async fn get_validation_keys(&self) -> AuthResult<Vec<Arc<SigningKey>>> {
        Ok(self
            .keys
            .read()
            .expect("key material lock poisoned")
            .clone())
    }
}
