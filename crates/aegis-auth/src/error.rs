//! Authorization server error types.
//!
//! This module defines all error types that can occur while validating and
//! issuing tokens. Every variant maps onto a registered OAuth/OIDC error code
//! via [`AuthError::oauth_error_code`], and the pipeline converts errors to
//! the minimal external `{error, error_description}` pair — internal detail
//! is logged, never returned to the client.

use std::fmt;

/// Errors that can occur during token request validation and issuance.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is malformed, missing a parameter, or violates a length limit.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The client credentials are invalid or the client is not registered.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization grant artifact is invalid, expired, consumed,
    /// or bound to a different client.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The authenticated client is not allowed to use this grant type.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of why the client is unauthorized.
        message: String,
    },

    /// The grant type is not supported by this server.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The requested scope is invalid, unknown, or exceeds what was granted.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The requested resource indicator is invalid or unknown (RFC 8707).
    #[error("Invalid target: {message}")]
    InvalidTarget {
        /// Description of why the resource indicator is invalid.
        message: String,
    },

    /// The device code or backchannel request has expired (RFC 8628 / CIBA).
    #[error("Expired token: {message}")]
    ExpiredToken {
        /// Description of what expired.
        message: String,
    },

    /// The end user denied the device or backchannel authorization request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The device or backchannel request is still awaiting end-user approval.
    /// Retryable: the client is expected to poll again.
    #[error("Authorization pending")]
    AuthorizationPending,

    /// The client polled inside the configured interval and must back off.
    /// Retryable: the client is expected to poll again, more slowly.
    #[error("Slow down")]
    SlowDown,

    /// The DPoP proof failed validation (RFC 9449).
    #[error("Invalid DPoP proof: {message}")]
    InvalidDpopProof {
        /// Description of why the proof is invalid.
        message: String,
    },

    /// DPoP nonce freshness failed; the client must retry with the
    /// server-provided nonce (RFC 9449 section 8).
    #[error("DPoP nonce required")]
    UseDpopNonce,

    /// An inbound access or identity token is invalid or malformed.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// An error occurred while storing or retrieving grant data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The server configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidTarget` error.
    #[must_use]
    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            message: message.into(),
        }
    }

    /// Creates a new `ExpiredToken` error.
    #[must_use]
    pub fn expired_token(message: impl Into<String>) -> Self {
        Self::ExpiredToken {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidDpopProof` error.
    #[must_use]
    pub fn invalid_dpop_proof(message: impl Into<String>) -> Self {
        Self::InvalidDpopProof {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error — reported once, never retried.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::InvalidClient { .. }
                | Self::InvalidGrant { .. }
                | Self::UnauthorizedClient { .. }
                | Self::UnsupportedGrantType { .. }
                | Self::InvalidScope { .. }
                | Self::InvalidTarget { .. }
                | Self::ExpiredToken { .. }
                | Self::AccessDenied { .. }
                | Self::InvalidDpopProof { .. }
                | Self::UseDpopNonce
                | Self::InvalidToken { .. }
        )
    }

    /// Returns `true` if this is a polling-pending state the client is
    /// expected to retry (`authorization_pending` / `slow_down`).
    #[must_use]
    pub fn is_polling_state(&self) -> bool {
        matches!(self, Self::AuthorizationPending | Self::SlowDown)
    }

    /// Returns `true` if this is an infrastructure fault that propagates
    /// as-is — no automatic retry is built into this layer.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging and monitoring.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. } | Self::UnsupportedGrantType { .. } => {
                ErrorCategory::Validation
            }
            Self::InvalidClient { .. } | Self::UnauthorizedClient { .. } => {
                ErrorCategory::Authentication
            }
            Self::InvalidGrant { .. } | Self::ExpiredToken { .. } | Self::AccessDenied { .. } => {
                ErrorCategory::Grant
            }
            Self::InvalidScope { .. } | Self::InvalidTarget { .. } => ErrorCategory::Authorization,
            Self::AuthorizationPending | Self::SlowDown => ErrorCategory::Polling,
            Self::InvalidDpopProof { .. } | Self::UseDpopNonce => ErrorCategory::Proof,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the registered OAuth/OIDC error code for this error.
    ///
    /// Codes follow the IETF OAuth, CIBA, and DPoP registries.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidTarget { .. } => "invalid_target",
            Self::ExpiredToken { .. } => "expired_token",
            Self::AccessDenied { .. } => "access_denied",
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::InvalidDpopProof { .. } => "invalid_dpop_proof",
            Self::UseDpopNonce => "use_dpop_nonce",
            Self::InvalidToken { .. } => "invalid_token",
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
        }
    }

    /// Returns the HTTP status code for this error at the token endpoint.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient { .. } => 401,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => 500,
            _ => 400,
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Request validation errors (malformed parameters).
    Validation,
    /// Client authentication errors.
    Authentication,
    /// Grant-state errors (expired/consumed/unauthorized artifacts).
    Grant,
    /// Scope and resource authorization errors.
    Authorization,
    /// Polling-pending states (device flow / CIBA).
    Polling,
    /// Proof-of-possession errors (DPoP / mTLS).
    Proof,
    /// Inbound token validation errors.
    Token,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Authentication => write!(f, "authentication"),
            Self::Grant => write!(f, "grant"),
            Self::Authorization => write!(f, "authorization"),
            Self::Polling => write!(f, "polling"),
            Self::Proof => write!(f, "proof"),
            Self::Token => write!(f, "token"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_client("client not found");
        assert_eq!(err.to_string(), "Invalid client: client not found");

        let err = AuthError::invalid_grant("authorization code expired");
        assert_eq!(err.to_string(), "Invalid grant: authorization code expired");

        let err = AuthError::AuthorizationPending;
        assert_eq!(err.to_string(), "Authorization pending");

        let err = AuthError::unsupported_grant_type("implicit");
        assert_eq!(err.to_string(), "Unsupported grant type: implicit");
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::invalid_grant("test");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert!(!err.is_polling_state());

        let err = AuthError::SlowDown;
        assert!(err.is_polling_state());
        assert!(!err.is_client_error());

        let err = AuthError::storage("database down");
        assert!(err.is_server_error());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(
            AuthError::invalid_target("test").oauth_error_code(),
            "invalid_target"
        );
        assert_eq!(
            AuthError::AuthorizationPending.oauth_error_code(),
            "authorization_pending"
        );
        assert_eq!(AuthError::SlowDown.oauth_error_code(), "slow_down");
        assert_eq!(
            AuthError::invalid_dpop_proof("bad htu").oauth_error_code(),
            "invalid_dpop_proof"
        );
        assert_eq!(AuthError::UseDpopNonce.oauth_error_code(), "use_dpop_nonce");
        assert_eq!(
            AuthError::expired_token("device code").oauth_error_code(),
            "expired_token"
        );
        assert_eq!(AuthError::internal("test").oauth_error_code(), "server_error");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::invalid_client("test").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(AuthError::SlowDown.category(), ErrorCategory::Polling);
        assert_eq!(AuthError::UseDpopNonce.category(), ErrorCategory::Proof);
        assert_eq!(
            AuthError::invalid_target("test").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::storage("test").category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(AuthError::invalid_client("test").http_status(), 401);
        assert_eq!(AuthError::invalid_grant("test").http_status(), 400);
        assert_eq!(AuthError::SlowDown.http_status(), 400);
        assert_eq!(AuthError::internal("test").http_status(), 500);
    }
}
