//! Token creation, validation, and refresh token lifecycle.

pub mod creation;
pub mod keys;
pub mod refresh;
pub mod response;
pub mod validation;

pub use creation::{TokenCreationConfig, TokenCreationService};
pub use keys::{InMemoryKeyMaterial, KeyMaterialService, SigningKey};
pub use refresh::{ConsumedTokenPolicy, RefreshTokenService, RejectConsumedTokens, RotationMode};
pub use response::TokenResponseGenerator;
pub use validation::{TokenValidator, TokenValidatorConfig, ValidatedAccessToken};
