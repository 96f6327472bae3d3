//! Bearer credential for the iNaturalist API
//!
//! The token is opaque to this crate. It is validated for emptiness only and
//! never written anywhere by the pipeline.

use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Opaque bearer token shared read-only by every request of a run
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wrap a token, rejecting empty or whitespace-only input
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(Error::Config("access token is empty".to_string()));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Raw token value
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted, {} chars>)", self.0.len())
    }
}
