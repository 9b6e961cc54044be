//! Live access token held by a request-issuing client

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use common::Secret;

/// The bearer token the client presents on its next request.
///
/// Clones share the same slot. Writes are synchronous, so a token set by a
/// hook is visible to the dispatch that immediately follows it.
#[derive(Clone)]
pub struct AccessToken {
    inner: Arc<RwLock<Secret<String>>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Secret::new(token.into()))),
        }
    }

    /// Snapshot of the current token.
    pub fn current(&self) -> Secret<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.to_owned());
    }

    /// True when no token has been issued yet.
    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .expose()
            .is_empty()
    }
}

impl Default for AccessToken {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken([REDACTED])")
    }
}
