//! Shared types for the token refresh workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
