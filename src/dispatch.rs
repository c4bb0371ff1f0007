//! Per-query orchestration: validate, fetch, normalize, render, send.
//!
//! ```text
//! Received ──▶ Invalid                         (1 message)
//!    │
//!    ▼
//! Validated ──▶ UpstreamFailed                 (1 message)
//!    │
//!    ▼
//! Fetched ──▶ ReportFailed                     (1 message)
//!    │
//!    ▼
//! Normalized ──▶ Rendered ──▶ Done             (headers, entries, footer)
//! ```
//!
//! [`Dispatcher::handle`] never returns an error and never panics on bad
//! upstream data; whatever happens, the user gets at least one message unless
//! the gateway itself is unreachable. The dispatcher holds no per-query state,
//! so one instance can serve any number of concurrent queries.

use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::QueryError;
use crate::gateway::MessageGateway;
use crate::models::{ChatId, Query, RenderedMessage};
use crate::normalize::normalize;
use crate::render::{render, render_error, welcome};
use crate::upstream::SearchBackend;

/// How a single `handle` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The text was blank; the usage hint was sent.
    Invalid,
    /// The upstream call failed; one error message was sent.
    UpstreamFailed,
    /// The payload could not be turned into a report; one error message was sent.
    ReportFailed,
    /// The full report was delivered.
    Done { messages: usize },
    /// The gateway rejected a message; the rest of the query was dropped.
    SendFailed { delivered: usize },
}

pub struct Dispatcher {
    backend: Arc<dyn SearchBackend>,
    gateway: Arc<dyn MessageGateway>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn SearchBackend>, gateway: Arc<dyn MessageGateway>) -> Self {
        Self { backend, gateway }
    }

    /// Runs one query end to end and delivers the result to `chat`.
    pub async fn handle(&self, chat: ChatId, text: &str) -> QueryOutcome {
        let query_id = Uuid::new_v4();
        let span = info_span!("query", %query_id, %chat);
        self.handle_inner(chat, text).instrument(span).await
    }

    /// Replies to `/start` with the welcome text.
    pub async fn greet(&self, chat: ChatId) -> QueryOutcome {
        match self.gateway.send(chat, &welcome()).await {
            Ok(()) => QueryOutcome::Done { messages: 1 },
            Err(e) => {
                error!(%chat, error = %e, "failed to deliver welcome message");
                QueryOutcome::SendFailed { delivered: 0 }
            }
        }
    }

    async fn handle_inner(&self, chat: ChatId, text: &str) -> QueryOutcome {
        debug!(text = %text, "query received");

        let (messages, failure) = match self.run_pipeline(text).await {
            Ok(messages) => (messages, None),
            Err(e) => {
                info!(error = %e, "query ended early");
                (vec![render_error(&e)], Some(e))
            }
        };

        let total = messages.len();
        for (delivered, message) in messages.iter().enumerate() {
            if let Err(e) = self.gateway.send(chat, message).await {
                error!(error = %e, delivered, total, "failed to deliver message, dropping the rest");
                return QueryOutcome::SendFailed { delivered };
            }
        }

        match failure {
            None => {
                info!(messages = total, "query completed");
                QueryOutcome::Done { messages: total }
            }
            Some(QueryError::InputInvalid) => QueryOutcome::Invalid,
            Some(QueryError::Upstream(_)) => QueryOutcome::UpstreamFailed,
            Some(QueryError::Report(_)) => QueryOutcome::ReportFailed,
        }
    }

    /// The pure part of the pipeline: everything except delivery.
    async fn run_pipeline(&self, text: &str) -> Result<Vec<RenderedMessage>, QueryError> {
        let query = Query::parse(text)?;
        let payload = self.backend.fetch(&query).await?;
        let report = normalize(payload)?;
        debug!(
            databases = report.databases.len(),
            entries = report.entry_count(),
            "report normalized"
        );
        Ok(render(&report))
    }
}
