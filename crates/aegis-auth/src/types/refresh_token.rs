//! Refresh token domain type.
//!
//! # Security
//!
//! - Refresh token handles are stored as SHA-256 hashes, never plaintext
//! - One-time-use rotation either deletes or marks the record consumed;
//!   either way exactly one valid handle exists at a time
//! - Sliding renewal never extends past the absolute lifetime

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::types::token::ProofType;

/// A refresh token record.
///
/// The handle returned to the client is never stored; lookups hash the
/// presented handle and search by digest, like password storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// SHA-256 hash of the handle value.
    pub handle_hash: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// Subject that authorized the token.
    pub subject_id: String,

    /// Server-side session the token is tied to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Scopes authorized for this token.
    pub authorized_scopes: Vec<String>,

    /// RFC 8707 resource indicators authorized for this token.
    #[serde(default)]
    pub authorized_resource_indicators: Vec<String>,

    /// Proof-of-possession mechanism bound at issuance, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_type: Option<ProofType>,

    /// Key thumbprint for the bound proof (DPoP `jkt` or `x5t#S256`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_key_thumbprint: Option<String>,

    /// When the token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Current lifetime in seconds, measured from `created_at`.
    /// Sliding renewal rewrites this field.
    pub lifetime_secs: u64,

    /// When the token was consumed by one-time-use rotation.
    /// `None` means never consumed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub consumed_at: Option<OffsetDateTime>,
}

impl RefreshToken {
    /// When this token expires.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.created_at + Duration::seconds(self.lifetime_secs as i64)
    }

    /// Returns `true` if this token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at()
    }

    /// Returns `true` if this token was consumed by rotation.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Hash a handle value using SHA-256.
    #[must_use]
    pub fn hash_handle(handle: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(handle.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a cryptographically secure random handle.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_handle() -> String {
        crate::types::grants::generate_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_token(lifetime_secs: u64) -> RefreshToken {
        RefreshToken {
            id: Uuid::new_v4(),
            handle_hash: RefreshToken::hash_handle("handle"),
            client_id: "app".to_string(),
            subject_id: "alice".to_string(),
            session_id: Some("sess-1".to_string()),
            authorized_scopes: vec!["openid".to_string(), "offline_access".to_string()],
            authorized_resource_indicators: vec![],
            proof_type: None,
            proof_key_thumbprint: None,
            created_at: OffsetDateTime::now_utc(),
            lifetime_secs,
            consumed_at: None,
        }
    }

    #[test]
    fn test_hash_handle() {
        let hash = RefreshToken::hash_handle("some-handle");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, RefreshToken::hash_handle("some-handle"));
        assert_ne!(hash, RefreshToken::hash_handle("other-handle"));
    }

    #[test]
    fn test_expiry() {
        let mut token = test_token(3600);
        assert!(!token.is_expired());

        token.created_at = OffsetDateTime::now_utc() - Duration::seconds(3601);
        assert!(token.is_expired());
    }

    #[test]
    fn test_consumed() {
        let mut token = test_token(3600);
        assert!(!token.is_consumed());

        token.consumed_at = Some(OffsetDateTime::now_utc());
        assert!(token.is_consumed());
    }

    #[test]
    fn test_serde_roundtrip() {
        let token = test_token(3600);
        let json = serde_json::to_string(&token).unwrap();
        let parsed: RefreshToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, token.id);
        assert_eq!(parsed.handle_hash, token.handle_hash);
        assert_eq!(parsed.lifetime_secs, token.lifetime_secs);
        assert!(parsed.consumed_at.is_none());
    }
}
