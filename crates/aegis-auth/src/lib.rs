//! # aegis-auth
//!
//! OpenID Connect / OAuth 2.0 provider core: the token request validation
//! and issuance pipeline.
//!
//! This crate provides:
//! - The token request orchestrator with per-grant validators
//!   (authorization code, client credentials, password, refresh token,
//!   device code, CIBA, extension grants)
//! - DPoP proof-of-possession validation with replay protection (RFC 9449)
//! - Scope and RFC 8707 resource-indicator resolution
//! - Token creation and validation over rotating key material
//! - Refresh token rotation with sliding/absolute lifetimes
//! - Server-side session coordination with back-channel logout fan-out
//!
//! ## Overview
//!
//! An inbound token request is authenticated (secret validators), run
//! through the [`oauth::TokenRequestValidator`] pipeline, and turned into
//! tokens by the [`token::TokenCreationService`]. Persistence is abstract:
//! every store the pipeline touches is a trait in [`storage`], implemented
//! by the `aegis-auth-memory` crate for development and testing.
//!
//! ## Modules
//!
//! - [`config`] - Server configuration tree
//! - [`oauth`] - Request validation pipeline and grant state machines
//! - [`dpop`] - DPoP proof validator and nonce service
//! - [`token`] - Token creation, validation, refresh token lifecycle
//! - [`session`] - Server-side sessions and coordination
//! - [`storage`] - Store traits
//! - [`http`] - Axum token endpoint handler

pub mod config;
pub mod dpop;
pub mod error;
pub mod http;
pub mod oauth;
pub mod profile;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{
    AuthConfig, CibaConfig, DeviceFlowConfig, DpopConfig, OAuthConfig, SessionConfig,
    SigningConfig,
};
pub use error::{AuthError, ErrorCategory};

/// Type alias for authorization server results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use aegis_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, CibaConfig, DeviceFlowConfig, DpopConfig, OAuthConfig};
    pub use crate::dpop::{
        DpopProofContext, DpopProofValidationResult, DpopProofValidator,
    };
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::oauth::{
        BackchannelAuthService, BackchannelRequestValidator, ClientValidationResult,
        DeviceCodeValidator, DeviceFlowService, PollThrottle, ResourceValidator,
        TokenRequestParams, TokenRequestValidator, TokenResponse, ValidatedTokenRequest,
    };
    pub use crate::profile::{AllowAllProfiles, ProfileService};
    pub use crate::session::{ServerSideSession, SessionCoordinationService};
    pub use crate::storage::{
        AuthorizationCodeStore, BackchannelRequestStore, ClientStore, DeviceFlowStore,
        DistributedCache, ReferenceTokenStore, RefreshTokenStore, ReplayCache, ResourceStore,
        ServerSideSessionStore,
    };
    pub use crate::token::{
        InMemoryKeyMaterial, KeyMaterialService, RefreshTokenService, TokenCreationService,
        TokenResponseGenerator, TokenValidator,
    };
    pub use crate::types::{
        Client, GrantType, RefreshToken, RefreshTokenExpiration, RefreshTokenUsage, Resources,
        Token,
    };
}
