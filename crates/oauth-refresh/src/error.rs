//! Error types for refresh-token exchanges

/// Errors from a single call to the token endpoint.
///
/// `Clone` because one failed refresh is observed by every caller that joined
/// it, each receiving its own copy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Transport failure: the token endpoint could not be reached or the body
    /// could not be read.
    #[error("token refresh request failed: {0}")]
    Request(String),

    /// The token endpoint answered with a non-success status, e.g.
    /// `400 invalid_grant` for a revoked refresh token.
    #[error("token endpoint rejected refresh ({status}): {body}")]
    Response { status: u16, body: String },

    /// The endpoint answered successfully but the payload is malformed or
    /// missing required fields.
    #[error("incomplete token response: {0}")]
    PartialResponse(String),
}

impl Error {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Request(_) => "transport",
            Error::Response { .. } => "rejected",
            Error::PartialResponse(_) => "malformed",
        }
    }
}

/// Result alias for refresh operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_cover_taxonomy() {
        assert_eq!(Error::Request("refused".into()).kind(), "transport");
        assert_eq!(
            Error::Response {
                status: 400,
                body: "invalid_grant".into()
            }
            .kind(),
            "rejected"
        );
        assert_eq!(Error::PartialResponse("no token".into()).kind(), "malformed");
    }

    #[test]
    fn response_display_includes_status_and_body() {
        let err = Error::Response {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("400"), "got: {msg}");
        assert!(msg.contains("invalid_grant"), "got: {msg}");
    }
}
