//! Outbound side of the messaging gateway.
//!
//! The dispatcher hands every [`RenderedMessage`] to a [`MessageGateway`].
//! Implementations own the transport concerns the pipeline ignores: markup
//! syntax, message length limits, and delivery retries.
//!
//! - [`crate::telegram::TelegramGateway`]: the Telegram Bot API.
//! - [`ConsoleGateway`]: prints to stdout; used by `relay query`.

use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;

use crate::models::{ChatId, Formatting, RenderedMessage};

/// Delivers rendered messages to a chat.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Sends one message. Returns once the transport accepted it.
    async fn send(&self, chat: ChatId, message: &RenderedMessage) -> Result<()>;
}

/// Writes messages to stdout, separated by blank lines.
///
/// Code blocks are fenced the same way the Telegram gateway fences them so
/// the output reads like the chat transcript.
pub struct ConsoleGateway;

#[async_trait]
impl MessageGateway for ConsoleGateway {
    async fn send(&self, _chat: ChatId, message: &RenderedMessage) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        match message.formatting {
            Formatting::MarkdownCodeBlock => writeln!(out, "```js\n{}\n```\n", message.text)?,
            Formatting::PlainText | Formatting::MarkdownBlock => {
                writeln!(out, "{}\n", message.text)?
            }
        }
        out.flush()?;
        Ok(())
    }
}
