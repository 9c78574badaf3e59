//! DPoP proof-of-possession validation (RFC 9449).
//!
//! A DPoP proof is a short-lived JWT, signed with the client's own key,
//! presented in the `DPoP` header of a token or resource request. The
//! validator runs four sequential stages, each short-circuiting on error:
//!
//! 1. **Header** — parse, `typ` must be `dpop+jwt`, `alg` in the
//!    allow-list, embedded `jwk` present and public-only
//! 2. **Signature** — verify against the embedded key, extract claims
//! 3. **Payload** — `jti` present, `htm`/`htu` match the request exactly,
//!    `iat` present
//! 4. **Freshness + Replay** — `iat` window and/or server nonce per the
//!    configured mode, then the `jti` is inserted into the replay cache
//!
//! The replay check runs strictly last: a proof that fails any earlier
//! stage never burns its `jti` in the replay cache.

pub mod nonce;
pub mod validator;

pub use nonce::DpopNonceService;
pub use validator::{
    DpopProofContext, DpopProofError, DpopProofValidationResult, DpopProofValidator,
};
