//! Turns a [`NormalizedReport`] into the ordered list of chat messages.
//!
//! Output for a report with databases `A{a1, a2}` and `B{}`:
//!
//! ```text
//! header(A)  MarkdownBlock
//! a1         MarkdownCodeBlock
//! a2         MarkdownCodeBlock
//! header(B)  MarkdownBlock
//! empty      MarkdownBlock
//! footer     MarkdownBlock
//! ```
//!
//! Rendering is a pure function of the report. Message length limits are not
//! enforced here; the gateway owns them.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::io;
use tracing::warn;

use crate::error::{EntryRenderError, QueryError, ReportError, UpstreamError};
use crate::models::{Entry, NormalizedReport, RenderedMessage};

pub const FOOTER: &str = "🔴 *Credit by Smarty Sunny*";
pub const EMPTY_DATABASE: &str = "⚠️ Empty database entry.";
pub const WELCOME: &str = "👋 Welcome to *Smarty Sunny Bot*\n\n\
🔍 Send your target number/email (e.g. +91********** or email@example.com)\n\
_I will search for leaked data if available._\n\n\
🔴 *Credit by Smart Sunny*";

/// Renders every database group followed by the footer.
pub fn render(report: &NormalizedReport) -> Vec<RenderedMessage> {
    let mut messages = Vec::with_capacity(report.databases.len() * 2 + report.entry_count() + 1);

    for db in &report.databases {
        messages.push(header(&db.display_name));

        if db.entries.is_empty() {
            messages.push(RenderedMessage::markdown(EMPTY_DATABASE));
            continue;
        }

        for entry in &db.entries {
            match render_entry(entry) {
                Ok(text) => messages.push(RenderedMessage::code_block(text)),
                Err(e) => {
                    warn!(database = %db.display_name, error = %e, "entry could not be rendered");
                    messages.push(entry_failure(&e));
                }
            }
        }
    }

    messages.push(RenderedMessage::markdown(FOOTER));
    messages
}

/// Header announcing a database group.
pub fn header(display_name: &str) -> RenderedMessage {
    RenderedMessage::markdown(format!("📁 *Database:* `{}`", display_name))
}

/// Encodes one entry as a brace-delimited `key: <json>` block.
///
/// ```text
/// {
///   Email: "a@example.com"
///   Age: 31
/// }
/// ```
pub fn render_entry(entry: &Entry) -> Result<String, EntryRenderError> {
    encode_fields(&entry.fields)
}

/// Placeholder sent in place of an entry that could not be encoded.
pub fn entry_failure(err: &EntryRenderError) -> RenderedMessage {
    RenderedMessage::plain(format!("⚠️ Error formatting entry: {}", err))
}

fn encode_fields(fields: &Map<String, Value>) -> Result<String, EntryRenderError> {
    let mut lines = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        lines.push(format!("  {}: {}", key, encode_value(value)?));
    }
    Ok(format!("{{\n{}\n}}", lines.join("\n")))
}

/// Single-line JSON with `", "` between items and `": "` after keys.
pub fn encode_value(value: &Value) -> Result<String, EntryRenderError> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut serializer)?;
    // serde_json only ever writes UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// The single message sent when a query ends early.
pub fn render_error(error: &QueryError) -> RenderedMessage {
    let text = match error {
        QueryError::InputInvalid => "⚠️ Please send a phone number or email to search.".to_string(),
        QueryError::Upstream(UpstreamError::Network(cause)) => {
            format!("❌ API ERROR (network): {}", cause)
        }
        QueryError::Upstream(UpstreamError::Decode(_)) => {
            "❌ API ERROR: invalid JSON response.".to_string()
        }
        QueryError::Report(ReportError::UpstreamReported(message)) => {
            format!("🚫 API Error: {}", message)
        }
        QueryError::Report(ReportError::NoData) => "❌ No data found.".to_string(),
        QueryError::Report(ReportError::Malformed) => "❌ Unexpected API response.".to_string(),
    };
    RenderedMessage::plain(text)
}

/// Greeting sent in reply to `/start`.
pub fn welcome() -> RenderedMessage {
    RenderedMessage::markdown(WELCOME)
}
