//! Replay cache trait.
//!
//! Tracks one-time handles (DPoP proof `jti`, client assertion `jti`) to
//! enforce at-most-once presentation.
//!
//! # Implementation Notes
//!
//! `add_if_not_exists` must be a single atomic check-then-insert per key.
//! A separate exists-check followed by a write races between two
//! concurrent presentations of the same token; a correct implementation
//! uses a conditional insert:
//!
//! ```sql
//! INSERT INTO replay (purpose, handle, expires_at)
//! VALUES ($1, $2, $3)
//! ON CONFLICT DO NOTHING
//! RETURNING handle
//! ```

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// Storage trait for replay detection.
///
/// Entries are keyed by `(purpose, handle)` so distinct consumers
/// (DPoP proofs, client assertions) never collide.
#[async_trait]
pub trait ReplayCache: Send + Sync {
    /// Atomically records a handle if it was not already present.
    ///
    /// # Arguments
    ///
    /// * `purpose` - Namespace for the handle (e.g. `"DPoPJwtId"`)
    /// * `handle` - The one-time value to record
    /// * `expires_at` - When the entry can be evicted; must be at least
    ///   the handle's validity window plus clock skew
    ///
    /// # Returns
    ///
    /// Returns `true` if the handle was recorded (first presentation),
    /// `false` if it already existed (replay detected).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn add_if_not_exists(
        &self,
        purpose: &str,
        handle: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Deletes expired entries. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
