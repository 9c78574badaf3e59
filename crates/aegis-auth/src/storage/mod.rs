//! Storage traits for grant artifacts, sessions, and caches.
//!
//! This module defines the store contracts the validation pipeline consumes:
//!
//! - Client and resource registrations
//! - Authorization codes, device codes, backchannel requests
//! - Refresh and reference tokens
//! - Server-side sessions
//! - Replay cache and distributed cache
//!
//! # Implementations
//!
//! Reference in-memory implementations are provided in the
//! `aegis-auth-memory` crate; production deployments supply their own
//! persistence backends.

pub mod authorization_code;
pub mod backchannel;
pub mod cache;
pub mod client;
pub mod device_flow;
pub mod reference_token;
pub mod refresh_token;
pub mod replay;
pub mod resource;
pub mod session;

pub use authorization_code::AuthorizationCodeStore;
pub use backchannel::BackchannelRequestStore;
pub use cache::{CachedValue, DistributedCache};
pub use client::ClientStore;
pub use device_flow::DeviceFlowStore;
pub use reference_token::{ReferenceTokenStore, StoredReferenceToken};
pub use refresh_token::RefreshTokenStore;
pub use replay::ReplayCache;
pub use resource::ResourceStore;
pub use session::ServerSideSessionStore;
