//! Authenticated HTTP transport
//!
//! Every call carries the bearer credential. Non-2xx responses become
//! `TransportError::Status`, anything that prevents a response becomes
//! `TransportError::Network` (status 0). No retries happen here; the
//! pipeline owns the retry policy.

use crate::config::TransportSettings;
use crate::error::{ClassifyError, TransportError};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use inat_common::{Credential, Error};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::time::Instant;

pub use reqwest::Method;

/// Longest raw body excerpt kept in log lines
const LOG_BODY_LIMIT: usize = 512;

/// A file sent as one multipart form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartFile {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Request body, which also selects the request kind
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartFile),
}

impl RequestBody {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestBody::Empty => "empty",
            RequestBody::Json(_) => "json",
            RequestBody::Multipart(_) => "multipart",
        }
    }
}

/// 2xx response with its body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Deserialize the body into an endpoint's response type
    ///
    /// Failures keep the raw body for diagnosis.
    pub fn parse_json<T: DeserializeOwned>(&self, context: &'static str) -> Result<T, ClassifyError> {
        serde_json::from_str(&self.body).map_err(|e| {
            tracing::warn!(
                context,
                error = %e,
                body = %truncate_for_log(&self.body),
                "Unexpected response shape"
            );
            ClassifyError::parse(context, e.to_string(), &self.body)
        })
    }
}

/// HTTP operations used by the pipeline
///
/// Implemented by [`HttpTransport`] in production and by in-memory fakes in
/// tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    http_client: reqwest::Client,
    credential: Credential,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl HttpTransport {
    /// Build the client; failure here is a configuration problem
    pub fn new(credential: Credential, settings: &TransportSettings) -> inat_common::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = settings
            .requests_per_minute
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            http_client,
            credential,
            rate_limiter,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<TransportResponse, TransportError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let kind = body.kind();
        let mut builder = self
            .http_client
            .request(method.clone(), url)
            .header(AUTHORIZATION, self.credential.bearer_header())
            .header(ACCEPT, "application/json");

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(file) => {
                let part = Part::bytes(file.bytes)
                    .file_name(file.file_name)
                    .mime_str(&file.mime_type)
                    .map_err(|e| TransportError::Network {
                        cause: format!("invalid multipart body: {}", e),
                    })?;
                builder.multipart(Form::new().part(file.field, part))
            }
        };

        tracing::debug!(%method, url, kind, "Sending request");
        let started = Instant::now();

        let response = builder.send().await.map_err(|e| network_error(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| network_error(&e))?;

        tracing::debug!(
            %method,
            url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Received response"
        );

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn network_error(e: &reqwest::Error) -> TransportError {
    let cause = if e.is_timeout() {
        format!("timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    TransportError::Network { cause }
}

/// Cut long bodies for log output, on a char boundary
pub(crate) fn truncate_for_log(body: &str) -> &str {
    if body.len() <= LOG_BODY_LIMIT {
        return body;
    }
    let mut end = LOG_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
