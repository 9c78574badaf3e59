//! # aegis-auth-memory
//!
//! In-memory implementations of every `aegis-auth` storage trait, backed
//! by process-wide concurrent maps. Suitable for development, testing,
//! and single-instance deployments; production clusters supply their own
//! persistence backends.
//!
//! Atomicity notes:
//! - The replay cache uses a single atomic entry operation for its
//!   check-then-insert, never a separate exists-check plus write
//! - Device-code update-by-user-code runs under an explicit per-store
//!   lock scoping the read-modify-write sequence

pub mod cache;
pub mod clients;
pub mod grants;
pub mod resources;
pub mod sessions;
pub mod tokens;

pub use cache::{InMemoryDistributedCache, InMemoryReplayCache};
pub use clients::InMemoryClientStore;
pub use grants::{
    InMemoryAuthorizationCodeStore, InMemoryBackchannelRequestStore, InMemoryDeviceFlowStore,
};
pub use resources::InMemoryResourceStore;
pub use sessions::{InMemorySessionStore, RecordingLogoutNotifier};
pub use tokens::{InMemoryReferenceTokenStore, InMemoryRefreshTokenStore};
