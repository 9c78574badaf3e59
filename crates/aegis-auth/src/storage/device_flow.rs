//! Device flow store trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::DeviceCode;

/// Storage trait for device authorization grant artifacts (RFC 8628).
///
/// Records are looked up two ways: by device code (token endpoint polling)
/// and by user code (the interactive verification page). The
/// update-by-user-code path is a read-modify-write; implementations must
/// scope it under a lock or equivalent so concurrent approvals of the same
/// user code cannot interleave.
#[async_trait]
pub trait DeviceFlowStore: Send + Sync {
    /// Stores a new device flow record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn store(&self, code: &DeviceCode) -> AuthResult<()>;

    /// Finds a record by its device code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_device_code(&self, device_code: &str) -> AuthResult<Option<DeviceCode>>;

    /// Finds a record by its user code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_user_code(&self, user_code: &str) -> AuthResult<Option<DeviceCode>>;

    /// Replaces the record identified by `user_code` (end-user approval
    /// or denial).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidGrant` if no record exists for the user
    /// code, or an error if the storage operation fails.
    async fn update_by_user_code(&self, user_code: &str, code: &DeviceCode) -> AuthResult<()>;

    /// Removes a record by its device code (one-shot consume on success).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_by_device_code(&self, device_code: &str) -> AuthResult<()>;

    /// Deletes expired records. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
