//! Error types for coordinator construction

/// Errors from building a coordinator.
///
/// Refresh failures are not represented here: they are
/// `oauth_refresh::Error` values delivered to callbacks and joiners.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid coordinator configuration: {0}")]
    Config(String),
}

/// Result alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;
