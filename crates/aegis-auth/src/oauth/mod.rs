//! OAuth 2.0 / OIDC request validation.
//!
//! The modules here make up the token endpoint pipeline: PKCE, client
//! secret/proof validators, scope and resource resolution, the polling
//! grant state machines, and the [`TokenRequestValidator`] orchestrator
//! that sequences them.

pub mod backchannel;
pub mod device;
pub mod pkce;
pub mod resource_validator;
pub mod secrets;
pub mod throttle;
pub mod token_request;
pub mod token_request_validator;

pub use backchannel::{
    BackchannelAuthResponse, BackchannelAuthService, BackchannelGrantOutcome,
    BackchannelRequestValidator,
};
pub use device::{
    DeviceAuthorizationResponse, DeviceCodeValidator, DeviceFlowService, DeviceGrantOutcome,
};
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use resource_validator::{
    ParsedScopeValue, ResourceValidationRequest, ResourceValidationResult, ResourceValidator,
};
pub use secrets::{
    ClientAssertionClaims, PrivateKeyJwtValidator, SharedSecretValidator, StringOrArray,
    ThumbprintSecretValidator,
};
pub use throttle::PollThrottle;
pub use token_request::{
    ClientValidationResult, TokenRequestError, TokenRequestParams, TokenRequestValidationResult,
    TokenResponse, ValidatedTokenRequest,
};
pub use token_request_validator::{
    CustomTokenRequestValidator, DenyAllPasswordValidator, ExtensionGrantOutcome,
    ExtensionGrantValidator, PasswordGrantOutcome, ResourceOwnerPasswordValidator,
    TokenRequestResult, TokenRequestValidator,
};
