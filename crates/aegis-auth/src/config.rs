//! Authorization server configuration.
//!
//! This module provides the configuration tree for the provider core:
//! token lifetimes, DPoP proof validation options, device flow and CIBA
//! polling settings, and server-side session coordination defaults.
//!
//! # Example (TOML)
//!
//! ```toml
//! issuer = "https://id.example.com"
//!
//! [oauth]
//! access_token_lifetime = "1h"
//! refresh_token_absolute_lifetime = "30d"
//!
//! [dpop]
//! validate_nonce = true
//! proof_lifetime = "5m"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the authorization server core.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Server issuer URL (used in token `iss` claim and nonce binding).
    pub issuer: String,

    /// Token endpoint URL (used as audience for client assertions and
    /// as the expected `htu` of token-endpoint DPoP proofs).
    pub token_endpoint: String,

    /// OAuth 2.0 grant and token lifetime configuration.
    pub oauth: OAuthConfig,

    /// DPoP proof validation configuration.
    pub dpop: DpopConfig,

    /// Device authorization flow configuration.
    pub device_flow: DeviceFlowConfig,

    /// CIBA (backchannel authentication) configuration.
    pub ciba: CibaConfig,

    /// Server-side session coordination configuration.
    pub session: SessionConfig,

    /// Token signing configuration.
    pub signing: SigningConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            token_endpoint: "http://localhost:8080/connect/token".to_string(),
            oauth: OAuthConfig::default(),
            dpop: DpopConfig::default(),
            device_flow: DeviceFlowConfig::default(),
            ciba: CibaConfig::default(),
            session: SessionConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

/// OAuth 2.0 grant and token lifetime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime. Codes should be short-lived.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Default access token lifetime. Can be overridden per-client.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Default identity token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Maximum accepted length of the `grant_type` parameter.
    pub max_grant_type_length: usize,

    /// Maximum accepted length of a single `resource` parameter.
    pub max_resource_indicator_length: usize,

    /// Allowed clock skew when checking artifact and token expiration.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(300), // 5 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            id_token_lifetime: Duration::from_secs(300),           // 5 minutes
            max_grant_type_length: 100,
            max_resource_indicator_length: 512,
            clock_skew: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// DPoP proof validation configuration (RFC 9449).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DpopConfig {
    /// Validate proof freshness from the `iat` claim.
    pub validate_iat: bool,

    /// Validate proof freshness from a server-issued nonce.
    /// Both modes can be enabled at once.
    pub validate_nonce: bool,

    /// How long a proof is considered fresh from its `iat`.
    #[serde(with = "humantime_serde")]
    pub proof_lifetime: Duration,

    /// How long a server-issued nonce stays valid.
    #[serde(with = "humantime_serde")]
    pub nonce_lifetime: Duration,

    /// Allowed clock skew for `iat` freshness checks.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// JWS algorithms accepted on DPoP proof tokens.
    pub allowed_algorithms: Vec<String>,

    /// Secret used to protect server-issued nonces. Must be set to a
    /// high-entropy value in production.
    pub nonce_secret: String,
}

impl Default for DpopConfig {
    fn default() -> Self {
        Self {
            validate_iat: true,
            validate_nonce: false,
            proof_lifetime: Duration::from_secs(60),
            nonce_lifetime: Duration::from_secs(300),
            clock_skew: Duration::from_secs(10),
            allowed_algorithms: vec![
                "RS256".to_string(),
                "PS256".to_string(),
                "ES256".to_string(),
            ],
            nonce_secret: "insecure-dev-nonce-secret".to_string(),
        }
    }
}

impl DpopConfig {
    /// Enables nonce-based freshness validation.
    #[must_use]
    pub fn with_nonce_validation(mut self) -> Self {
        self.validate_nonce = true;
        self
    }

    /// Disables `iat`-based freshness validation.
    #[must_use]
    pub fn without_iat_validation(mut self) -> Self {
        self.validate_iat = false;
        self
    }

    /// Sets the proof lifetime.
    #[must_use]
    pub fn with_proof_lifetime(mut self, lifetime: Duration) -> Self {
        self.proof_lifetime = lifetime;
        self
    }
}

/// Device authorization flow configuration (RFC 8628).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceFlowConfig {
    /// Device code lifetime.
    #[serde(with = "humantime_serde")]
    pub code_lifetime: Duration,

    /// Minimum interval between token-endpoint polls for one device code.
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,

    /// Length of the generated user code.
    pub user_code_length: usize,
}

impl Default for DeviceFlowConfig {
    fn default() -> Self {
        Self {
            code_lifetime: Duration::from_secs(300), // 5 minutes
            polling_interval: Duration::from_secs(5),
            user_code_length: 8,
        }
    }
}

/// CIBA configuration (OpenID Connect Client-Initiated Backchannel
/// Authentication).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CibaConfig {
    /// Default backchannel authentication request lifetime.
    #[serde(with = "humantime_serde")]
    pub request_lifetime: Duration,

    /// Minimum interval between token-endpoint polls for one `auth_req_id`.
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,
}

impl Default for CibaConfig {
    fn default() -> Self {
        Self {
            request_lifetime: Duration::from_secs(600), // 10 minutes
            polling_interval: Duration::from_secs(5),
        }
    }
}

/// Server-side session coordination configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default for clients that don't set
    /// `coordinate_lifetime_with_user_session` explicitly.
    pub coordinate_client_lifetimes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            coordinate_client_lifetimes: false,
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// JWS algorithms the server may sign with, in preference order.
    pub allowed_algorithms: Vec<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            allowed_algorithms: vec!["RS256".to_string(), "PS256".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AuthConfig::default();
        assert_eq!(
            config.oauth.authorization_code_lifetime,
            Duration::from_secs(300)
        );
        assert_eq!(config.oauth.access_token_lifetime, Duration::from_secs(3600));
        assert!(config.dpop.validate_iat);
        assert!(!config.dpop.validate_nonce);
        assert_eq!(config.device_flow.polling_interval, Duration::from_secs(5));
        assert_eq!(config.ciba.polling_interval, Duration::from_secs(5));
        assert!(!config.session.coordinate_client_lifetimes);
    }

    #[test]
    fn test_dpop_config_builders() {
        let config = DpopConfig::default()
            .with_nonce_validation()
            .without_iat_validation()
            .with_proof_lifetime(Duration::from_secs(120));

        assert!(config.validate_nonce);
        assert!(!config.validate_iat);
        assert_eq!(config.proof_lifetime, Duration::from_secs(120));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = AuthConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AuthConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.issuer, config.issuer);
        assert_eq!(
            parsed.dpop.proof_lifetime,
            config.dpop.proof_lifetime
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"issuer": "https://id.example.com"}"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.issuer, "https://id.example.com");
        assert_eq!(config.oauth.access_token_lifetime, Duration::from_secs(3600));
    }
}
