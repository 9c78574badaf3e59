//! Domain types for the authorization server core.

pub mod client;
pub mod grants;
pub mod refresh_token;
pub mod resource;
pub mod secret;
pub mod token;

pub use client::{
    AccessTokenType, Client, GrantType, RefreshTokenExpiration, RefreshTokenUsage,
};
pub use grants::{AuthorizationCode, BackchannelAuthRequest, DeviceCode, GrantRequestState};
pub use refresh_token::RefreshToken;
pub use resource::{ApiResource, ApiScope, IdentityResource, Resources};
pub use secret::{ClientSecret, ParsedSecret, SecretType};
pub use token::{Confirmation, ProofType, Token, TokenType};
