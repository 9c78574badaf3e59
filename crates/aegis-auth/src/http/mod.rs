//! Axum HTTP handlers.

pub mod token;

pub use token::{TokenState, token_handler};
