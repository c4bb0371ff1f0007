//! Telegram Bot API adapter.
//!
//! Two halves share one [`TelegramClient`]:
//!
//! - **inbound**: [`TelegramClient::get_updates`] long-polls for new
//!   messages; the loop that drives it lives in [`crate::bot`].
//! - **outbound**: [`TelegramGateway`] implements [`MessageGateway`] on top
//!   of `sendMessage`.
//!
//! # Formatting
//!
//! | [`Formatting`] | Telegram |
//! |----------------|----------|
//! | `PlainText` | no `parse_mode` |
//! | `MarkdownBlock` | `parse_mode = "Markdown"` |
//! | `MarkdownCodeBlock` | `` ```js `` fence, `parse_mode = "Markdown"` |
//!
//! Texts are cut to [`MAX_MESSAGE_CHARS`]. Upstream data can contain
//! characters that break Markdown parsing, so a Markdown message rejected
//! with `400` is sent once more as plain text.
//!
//! # Retry Strategy
//!
//! - HTTP 429 → wait `retry_after` seconds (or the backoff delay) and retry
//! - HTTP 5xx and network errors → retry with backoff (1s, 2s)
//! - other 4xx → fail immediately
//! - at most [`MAX_SEND_ATTEMPTS`] attempts per message

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::gateway::MessageGateway;
use crate::models::{ChatId, Formatting, RenderedMessage};

/// Telegram's limit on the length of one text message.
pub const MAX_MESSAGE_CHARS: usize = 4096;
pub const MAX_SEND_ATTEMPTS: u32 = 3;

const CODE_FENCE_OPEN: &str = "```js\n";
const CODE_FENCE_CLOSE: &str = "\n```";
const ELLIPSIS: char = '…';
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram API error {code}: {description}")]
    Api {
        code: u16,
        description: String,
        retry_after: Option<u64>,
    },
}

impl GatewayError {
    fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Http(_) => true,
            GatewayError::Api { code, .. } => *code == 429 || *code >= 500,
        }
    }

    /// Wait before the next attempt; `attempt` counts from zero.
    fn retry_delay(&self, attempt: u32) -> Duration {
        match self {
            GatewayError::Api {
                retry_after: Some(secs),
                ..
            } => Duration::from_secs(*secs),
            _ => Duration::from_secs(1 << attempt.min(5)),
        }
    }

    fn is_markup_rejection(&self) -> bool {
        matches!(self, GatewayError::Api { code: 400, .. })
    }
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// One entry from `getUpdates`. Only the fields the bot reads are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl Update {
    /// The chat and text of a text message, if this update carries one.
    pub fn text_message(&self) -> Option<(ChatId, &str)> {
        let message = self.message.as_ref()?;
        let text = message.text.as_deref()?;
        Some((ChatId(message.chat.id), text))
    }
}

// ============ Client ============

/// Thin JSON client for `https://api.telegram.org/bot<token>/<method>`.
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &BotConfig, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), token),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<T, GatewayError> {
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.without_url()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Http(e.without_url()))?;

        let parsed: ApiResponse<T> = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(GatewayError::Api {
                    code: status.as_u16(),
                    description: format!("undecodable response: {}", e),
                    retry_after: None,
                })
            }
        };

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(GatewayError::Api {
                code: other.error_code.unwrap_or_else(|| status.as_u16()),
                description: other
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
                retry_after: other.parameters.and_then(|p| p.retry_after),
            }),
        }
    }

    /// Verifies the token and returns the bot's own account.
    pub async fn get_me(&self) -> Result<BotUser, GatewayError> {
        self.call("getMe", &json!({}), SEND_TIMEOUT).await
    }

    /// Long-polls for updates with `update_id >= offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, GatewayError> {
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        // The HTTP timeout must outlive the server-side long poll.
        let timeout = self.poll_timeout + Duration::from_secs(10);
        self.call("getUpdates", &body, timeout).await
    }

    pub async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut body = json!({
            "chat_id": chat.0,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = json!(mode);
        }
        let _: Value = self.call("sendMessage", &body, SEND_TIMEOUT).await?;
        Ok(())
    }
}

// ============ Gateway ============

/// [`MessageGateway`] that delivers through the Telegram Bot API.
pub struct TelegramGateway {
    client: Arc<TelegramClient>,
}

impl TelegramGateway {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }

    async fn deliver(
        &self,
        chat: ChatId,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut attempt = 0;
        loop {
            match self.client.send_message(chat, text, parse_mode).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_SEND_ATTEMPTS => {
                    let delay = e.retry_delay(attempt);
                    warn!(%chat, error = %e, attempt, ?delay, "sendMessage failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl MessageGateway for TelegramGateway {
    async fn send(&self, chat: ChatId, message: &RenderedMessage) -> Result<()> {
        let (text, parse_mode) = outgoing(message);
        match self.deliver(chat, &text, parse_mode).await {
            Ok(()) => Ok(()),
            Err(e) if parse_mode.is_some() && e.is_markup_rejection() => {
                debug!(%chat, error = %e, "markdown rejected, resending as plain text");
                self.deliver(chat, &plain_fallback(message), None).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Text and `parse_mode` for a message, fenced and cut to the length limit.
pub fn outgoing(message: &RenderedMessage) -> (String, Option<&'static str>) {
    match message.formatting {
        Formatting::PlainText => (truncate_chars(&message.text, MAX_MESSAGE_CHARS).into_owned(), None),
        Formatting::MarkdownBlock => (
            truncate_chars(&message.text, MAX_MESSAGE_CHARS).into_owned(),
            Some("Markdown"),
        ),
        Formatting::MarkdownCodeBlock => {
            let budget = MAX_MESSAGE_CHARS
                - CODE_FENCE_OPEN.chars().count()
                - CODE_FENCE_CLOSE.chars().count();
            let body = truncate_chars(&message.text, budget);
            (
                format!("{}{}{}", CODE_FENCE_OPEN, body, CODE_FENCE_CLOSE),
                Some("Markdown"),
            )
        }
    }
}

fn plain_fallback(message: &RenderedMessage) -> String {
    truncate_chars(&message.text, MAX_MESSAGE_CHARS).into_owned()
}

/// Cuts `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max: usize) -> Cow<'_, str> {
    if max == 0 {
        return Cow::Borrowed("");
    }
    match text.char_indices().nth(max) {
        None => Cow::Borrowed(text),
        Some(_) => {
            let keep: String = text.chars().take(max - 1).collect();
            Cow::Owned(format!("{}{}", keep, ELLIPSIS))
        }
    }
}
