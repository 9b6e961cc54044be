//! OAuth2 refresh-token grant client
//!
//! Provides the `AuthorizationClient` seam the refresh coordinator calls into,
//! an HTTP implementation that POSTs `grant_type=refresh_token` to a token
//! endpoint, and the error taxonomy shared by every refresh attempt:
//!
//! - `Error::Request`: the token endpoint could not be reached
//! - `Error::Response`: the endpoint answered with a non-success status
//! - `Error::PartialResponse`: the endpoint answered but the payload is unusable
//!
//! This crate knows nothing about concurrency or retries. The coordinator
//! decides when to call `refresh`; this crate only performs one exchange.

pub mod client;
pub mod constants;
pub mod error;
pub mod token;

pub use client::{AuthorizationClient, HttpAuthorizationClient};
pub use constants::*;
pub use error::{Error, Result};
pub use token::{ClientCredentials, TokenResponse, refresh_token};
