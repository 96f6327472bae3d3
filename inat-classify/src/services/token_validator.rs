//! Access token verification
//!
//! Checks the configured credential against the current-user endpoint before
//! a batch, so an expired token fails fast instead of once per image.

use crate::error::TransportError;
use crate::services::transport::{Method, RequestBody, Transport};
use std::sync::Arc;

/// Token validation outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// Accepted by the API
    Valid,
    /// Rejected (HTTP 401 or 403)
    Invalid,
    /// Could not decide: network failure or unexpected status
    Unreachable(String),
}

pub struct TokenValidator {
    transport: Arc<dyn Transport>,
    check_url: String,
}

impl TokenValidator {
    pub fn new(transport: Arc<dyn Transport>, check_url: impl Into<String>) -> Self {
        Self {
            transport,
            check_url: check_url.into(),
        }
    }

    /// Perform an authenticated GET and classify the answer
    pub async fn validate(&self) -> TokenStatus {
        tracing::debug!(url = %self.check_url, "Validating access token");

        match self
            .transport
            .request(Method::GET, &self.check_url, RequestBody::Empty)
            .await
        {
            Ok(response) => {
                tracing::info!(status_code = response.status, "Access token is valid");
                TokenStatus::Valid
            }
            Err(TransportError::Status { status, .. }) if status == 401 || status == 403 => {
                tracing::warn!(status_code = status, "Access token is invalid or expired");
                TokenStatus::Invalid
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token check inconclusive");
                TokenStatus::Unreachable(e.to_string())
            }
        }
    }
}
