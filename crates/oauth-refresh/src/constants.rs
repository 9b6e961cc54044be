//! OAuth2 refresh grant constants

/// `grant_type` value for the refresh-token grant (RFC 6749 section 6)
pub const REFRESH_GRANT_TYPE: &str = "refresh_token";

/// Default timeout for a single call to the token endpoint, in seconds
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;

/// Upper bound on how much of an error body is kept in `Error::Response`.
/// Token endpoints occasionally answer with full HTML error pages.
pub const MAX_ERROR_BODY_LEN: usize = 512;
