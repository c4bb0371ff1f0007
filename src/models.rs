//! Core data types that flow through the query pipeline.
//!
//! ```text
//! text ──▶ Query ──▶ UpstreamRequest ──▶ RawPayload ──▶ NormalizedReport ──▶ Vec<RenderedMessage>
//! ```
//!
//! Every value here is built fresh for one query and dropped once the last
//! message has been handed to the gateway.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{QueryError, UpstreamError};

/// Undecoded-but-parsed upstream body. Object key order is preserved.
pub type RawPayload = Value;

/// Outcome of one upstream call.
pub type UpstreamResult = Result<RawPayload, UpstreamError>;

/// Identifier of the chat a query came from and replies go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated search query: trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Trims `text` and rejects it if nothing is left.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(QueryError::InputInvalid);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// JSON body sent to the upstream search API.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest<'a> {
    pub token: &'a str,
    pub request: &'a str,
    pub limit: u32,
    pub lang: &'a str,
}

/// One record inside a database group, with upstream field order kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub fields: Map<String, Value>,
}

impl Entry {
    /// Coerces any JSON value into an entry.
    ///
    /// Objects are used as-is; every other shape is wrapped as
    /// `{"value": <element>}` so the renderer always gets a field map.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                Self { fields }
            }
        }
    }
}

/// One named result bucket returned by the upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseGroup {
    pub display_name: String,
    pub entries: Vec<Entry>,
}

/// The strict model built from one upstream payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedReport {
    pub databases: Vec<DatabaseGroup>,
}

impl NormalizedReport {
    pub fn entry_count(&self) -> usize {
        self.databases.iter().map(|db| db.entries.len()).sum()
    }
}

/// How the gateway should present a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Formatting {
    PlainText,
    MarkdownBlock,
    MarkdownCodeBlock,
}

/// One outgoing chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub text: String,
    pub formatting: Formatting,
}

impl RenderedMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            formatting: Formatting::PlainText,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            formatting: Formatting::MarkdownBlock,
        }
    }

    pub fn code_block(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            formatting: Formatting::MarkdownCodeBlock,
        }
    }
}
