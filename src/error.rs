//! Error taxonomy for the query pipeline.
//!
//! Every failure a single query can run into is one of these types. The
//! terminal ones ([`QueryError`] and what it wraps) end the query with exactly
//! one user-visible message; [`EntryRenderError`] is local to one entry and
//! never escapes the renderer.
//!
//! | Error | Raised by | Scope |
//! |-------|-----------|-------|
//! | [`QueryError::InputInvalid`] | dispatcher | terminal |
//! | [`UpstreamError::Network`] | upstream client | terminal |
//! | [`UpstreamError::Decode`] | upstream client | terminal |
//! | [`ReportError::UpstreamReported`] | normalizer | terminal |
//! | [`ReportError::NoData`] | normalizer | terminal |
//! | [`ReportError::Malformed`] | normalizer | terminal |
//! | [`EntryRenderError`] | renderer | one entry |

use thiserror::Error;

/// Failure to obtain a JSON payload from the upstream search API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Connection refused, DNS failure, timeout, or a body that could not be read.
    #[error("network error: {0}")]
    Network(String),
    /// The body was read but is not valid JSON (or exceeded the size cap).
    #[error("invalid JSON response: {0}")]
    Decode(String),
}

/// Failure to turn a decoded payload into a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// The upstream answered with an explicit `"Error code"` field.
    #[error("upstream reported an error: {0}")]
    UpstreamReported(String),
    /// The `"List"` field is missing or empty.
    #[error("no data found")]
    NoData,
    /// The top-level payload is not a JSON object.
    #[error("unexpected response shape")]
    Malformed,
}

/// Any terminal failure of a single query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query is empty")]
    InputInvalid,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// A single entry could not be encoded as text.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EntryRenderError(#[from] pub serde_json::Error);
