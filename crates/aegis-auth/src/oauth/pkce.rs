//! PKCE (Proof Key for Code Exchange) implementation
//!
//! Implements RFC 7636 with both the `plain` and `S256` transforms.
//! Challenge comparison is constant-time in both cases.
//!
//! # Example
//!
//! ```
//! use aegis_auth::oauth::{PkceVerifier, PkceChallenge, PkceChallengeMethod};
//!
//! // Client generates a verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier, PkceChallengeMethod::S256);
//!
//! // Server stores the challenge, later verifies with the verifier from
//! // the token request
//! let stored = PkceChallenge::new(challenge.as_str().to_string()).unwrap();
//! assert!(stored.verify(&verifier, PkceChallengeMethod::S256).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::types::secret::constant_time_eq;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be unreserved ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,

    /// Challenge is empty or over-long.
    #[error("Invalid challenge format")]
    InvalidChallengeFormat,

    /// Unknown challenge method.
    #[error("Unsupported challenge method: {0}")]
    UnsupportedMethod(String),

    /// PKCE verification failed (verifier doesn't match challenge).
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Get the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidVerifierLength(_)
            | Self::InvalidVerifierCharacters
            | Self::InvalidChallengeFormat
            | Self::UnsupportedMethod(_) => "invalid_request",
            Self::VerificationFailed => "invalid_grant",
        }
    }
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PkceChallengeMethod {
    /// The verifier is the challenge, unchanged.
    Plain,
    /// SHA-256 hash of the verifier.
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Parse challenge method from string.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything other than
    /// `plain` or `S256`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "plain" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Get the method as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// A high-entropy cryptographic random string using the unreserved
/// characters `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`, 43 to 128
/// characters long (RFC 7636 section 4.1).
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a new verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Length is not between 43 and 128 characters
    /// - Contains characters other than `[A-Za-z0-9-._~]`
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();

        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generate a cryptographically random verifier.
    ///
    /// Generates 32 random bytes and encodes them as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        // `gen` is a reserved keyword in Rust 2024, so we use r#gen
        let bytes: [u8; 32] = rng.r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PkceVerifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// PKCE code challenge.
///
/// For `S256` the challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`;
/// for `plain` it is the verifier itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Create a challenge from a verifier using the given method.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier, method: PkceChallengeMethod) -> Self {
        match method {
            PkceChallengeMethod::Plain => Self(verifier.0.clone()),
            PkceChallengeMethod::S256 => {
                let mut hasher = Sha256::new();
                hasher.update(verifier.0.as_bytes());
                Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
            }
        }
    }

    /// Create a challenge from a raw string (as stored on the grant).
    ///
    /// # Errors
    ///
    /// Returns `PkceError::InvalidChallengeFormat` if the string is empty
    /// or longer than the maximum verifier length.
    pub fn new(challenge: String) -> Result<Self, PkceError> {
        if challenge.is_empty() || challenge.len() > 128 {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self(challenge))
    }

    /// Verify that a verifier matches this challenge under the given method.
    ///
    /// The comparison is constant-time.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` if the verifier doesn't match.
    pub fn verify(
        &self,
        verifier: &PkceVerifier,
        method: PkceChallengeMethod,
    ) -> Result<(), PkceError> {
        let expected = Self::from_verifier(verifier, method);
        if constant_time_eq(&self.0, &expected.0) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// Get the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the challenge and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}
