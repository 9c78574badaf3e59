//! Reference token store trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::types::Token;

/// A persisted reference access token.
///
/// Reference tokens are opaque handles; the token content lives server-side
/// and is resolved on every validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReferenceToken {
    /// The abstract token this handle resolves to.
    pub token: Token,

    /// When the handle was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StoredReferenceToken {
    /// When this reference token expires.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.created_at + Duration::seconds(self.token.lifetime_secs as i64)
    }

    /// Returns `true` if the reference token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at()
    }
}

/// Storage trait for reference access tokens.
#[async_trait]
pub trait ReferenceTokenStore: Send + Sync {
    /// Stores a token under the given opaque handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn store(&self, handle: &str, token: &StoredReferenceToken) -> AuthResult<()>;

    /// Finds a token by its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, handle: &str) -> AuthResult<Option<StoredReferenceToken>>;

    /// Removes a token by its handle (revocation).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove(&self, handle: &str) -> AuthResult<()>;

    /// Deletes expired tokens. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
