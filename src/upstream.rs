//! Client for the upstream search API.
//!
//! The dispatcher talks to the upstream through the [`SearchBackend`] trait so
//! tests can substitute a canned backend. [`HttpSearchBackend`] is the real
//! implementation: one JSON `POST` per query, bounded by the configured
//! timeout, never retried.
//!
//! # Classification
//!
//! | Situation | Result |
//! |-----------|--------|
//! | connect/DNS failure, timeout, body read error | [`UpstreamError::Network`] |
//! | body is not JSON, or larger than `max_response_bytes` | [`UpstreamError::Decode`] |
//! | any JSON body, whatever the HTTP status | `Ok(payload)` |
//!
//! The upstream reports its own failures inside the body (`"Error code"`), so
//! the status code is only logged.

use anyhow::Result;
use async_trait::async_trait;
use std::error::Error as StdError;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use crate::models::{Query, RawPayload, UpstreamRequest, UpstreamResult};

/// Source of raw search payloads.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Runs one query. Must resolve (never hang) and never panic.
    async fn fetch(&self, query: &Query) -> UpstreamResult;
}

/// [`SearchBackend`] backed by the HTTPS search API.
pub struct HttpSearchBackend {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl HttpSearchBackend {
    /// Builds the HTTP client once; it is shared by every query.
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .build()?;
        Ok(Self { client, config })
    }

    fn request_body<'a>(&'a self, query: &'a Query) -> UpstreamRequest<'a> {
        UpstreamRequest {
            token: &self.config.token,
            request: query.as_str(),
            limit: self.config.limit,
            lang: &self.config.lang,
        }
    }

    /// Reads the body chunk by chunk, stopping once the size cap is exceeded.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, UpstreamError> {
        let cap = self.config.max_response_bytes;
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| UpstreamError::Network(describe(e)))?
        {
            if body.len() + chunk.len() > cap {
                return Err(UpstreamError::Decode(format!(
                    "response body exceeds {} bytes",
                    cap
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn fetch(&self, query: &Query) -> UpstreamResult {
        let response = self
            .client
            .post(&self.config.url)
            .json(&self.request_body(query))
            .send()
            .await
            .map_err(|e| {
                let cause = describe(e);
                warn!(error = %cause, "upstream request failed");
                UpstreamError::Network(cause)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "upstream answered with a non-success status");
        }

        let body = self.read_body(response).await?;
        debug!(%status, bytes = body.len(), "upstream response received");

        decode_payload(&body)
    }
}

/// Parses a response body into a payload.
pub fn decode_payload(body: &[u8]) -> Result<RawPayload, UpstreamError> {
    serde_json::from_slice(body).map_err(|e| UpstreamError::Decode(e.to_string()))
}

/// Human-readable cause of a transport failure, without the endpoint URL.
fn describe(err: reqwest::Error) -> String {
    if err.is_timeout() {
        return "request timed out".to_string();
    }
    let err = err.without_url();
    let mut message = err.to_string();
    let mut source = StdError::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
