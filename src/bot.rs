//! Inbound update loop and per-chat scheduling.
//!
//! ```text
//! getUpdates ──▶ ChatQueues::submit ──▶ worker(chat 1) ──▶ Dispatcher::handle
//!                                  └──▶ worker(chat 2) ──▶ Dispatcher::handle
//! ```
//!
//! Each chat gets its own worker task fed by an unbounded channel, so a
//! chat's queries are answered strictly in arrival order while different
//! chats run concurrently. Workers exit after sitting idle for
//! `bot.worker_idle_secs`; the next message from that chat starts a new one,
//! which waits for its predecessor to finish draining before it runs.
//! A worker that panics only loses its own chat's queue.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::{Dispatcher, QueryOutcome};
use crate::models::ChatId;
use crate::telegram::{TelegramClient, TelegramGateway};
use crate::upstream::HttpSearchBackend;

/// What an incoming text asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// `/start`, optionally addressed as `/start@BotName` or with a payload.
    Start,
    /// Anything else, including other slash commands.
    Query(&'a str),
}

pub fn classify(text: &str) -> Inbound<'_> {
    let command = text
        .split_whitespace()
        .next()
        .unwrap_or("")
        .split('@')
        .next()
        .unwrap_or("");
    if command == "/start" {
        Inbound::Start
    } else {
        Inbound::Query(text)
    }
}

/// Handles one inbound text for `chat`.
pub async fn handle_text(dispatcher: &Dispatcher, chat: ChatId, text: &str) -> QueryOutcome {
    match classify(text) {
        Inbound::Start => dispatcher.greet(chat).await,
        Inbound::Query(text) => dispatcher.handle(chat, text).await,
    }
}

/// Routes texts to one sequential worker per chat.
pub struct ChatQueues {
    dispatcher: Arc<Dispatcher>,
    idle: Duration,
    workers: HashMap<ChatId, Worker>,
}

struct Worker {
    tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl ChatQueues {
    pub fn new(dispatcher: Arc<Dispatcher>, idle: Duration) -> Self {
        Self {
            dispatcher,
            idle,
            workers: HashMap::new(),
        }
    }

    /// Queues `text` behind any earlier texts from the same chat.
    pub fn submit(&mut self, chat: ChatId, text: String) {
        let (text, previous) = match self.workers.remove(&chat) {
            Some(worker) => match worker.tx.send(text) {
                Ok(()) => {
                    self.workers.insert(chat, worker);
                    return;
                }
                // The worker went idle or died. It may still be draining, so
                // the replacement waits for it before taking new texts.
                Err(mpsc::error::SendError(text)) => (text, Some(worker.task)),
            },
            None => (text, None),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // A new channel cannot be closed yet.
        let _ = tx.send(text);
        let task = tokio::spawn(run_worker(
            chat,
            rx,
            previous,
            self.dispatcher.clone(),
            self.idle,
        ));
        self.workers.insert(chat, Worker { tx, task });
    }

    /// Forgets workers that have fully exited.
    pub fn prune(&mut self) {
        self.workers.retain(|_, worker| !worker.task.is_finished());
    }

    pub fn active_workers(&self) -> usize {
        self.workers
            .values()
            .filter(|worker| !worker.task.is_finished())
            .count()
    }
}

async fn run_worker(
    chat: ChatId,
    mut rx: mpsc::UnboundedReceiver<String>,
    previous: Option<JoinHandle<()>>,
    dispatcher: Arc<Dispatcher>,
    idle: Duration,
) {
    if let Some(previous) = previous {
        // A panicked predecessor is already logged by the runtime.
        let _ = previous.await;
    }
    debug!(%chat, "chat worker started");
    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(text)) => {
                handle_text(&dispatcher, chat, &text).await;
            }
            Ok(None) => break,
            Err(_) => {
                // Refuse new work, then finish whatever was already queued.
                rx.close();
                while let Ok(text) = rx.try_recv() {
                    handle_text(&dispatcher, chat, &text).await;
                }
                break;
            }
        }
    }
    debug!(%chat, "chat worker stopped");
}

/// Polls Telegram forever, feeding every text message into `queues`.
///
/// Poll failures are logged and retried with exponential backoff
/// (1s, 2s, 4s … 32s); they never end the loop.
pub async fn run_polling(client: Arc<TelegramClient>, mut queues: ChatQueues) {
    let mut offset: i64 = 0;
    let mut failures: u32 = 0;

    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => {
                failures = 0;
                updates
            }
            Err(e) => {
                let delay = Duration::from_secs(1 << failures.min(5));
                warn!(error = %e, ?delay, "getUpdates failed");
                failures = failures.saturating_add(1);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            match update.text_message() {
                Some((chat, text)) => queues.submit(chat, text.to_string()),
                None => debug!(update_id = update.update_id, "ignoring non-text update"),
            }
        }
        queues.prune();
    }
}

/// Starts the Telegram bot with the configured upstream.
///
/// Verifies the bot token with `getMe` first so a bad token fails fast.
pub async fn run_bot(config: &Config) -> Result<()> {
    let token = config.bot_token()?;
    let client = Arc::new(TelegramClient::new(&config.bot, token)?);

    let me = client
        .get_me()
        .await
        .context("Telegram rejected the bot token")?;
    info!(
        bot_id = me.id,
        username = me.username.as_deref().unwrap_or("-"),
        "bot authenticated"
    );

    let backend = Arc::new(HttpSearchBackend::new(config.upstream.clone())?);
    let gateway = Arc::new(TelegramGateway::new(client.clone()));
    let dispatcher = Arc::new(Dispatcher::new(backend, gateway));
    let queues = ChatQueues::new(dispatcher, Duration::from_secs(config.bot.worker_idle_secs));

    info!("bot is polling for updates");
    run_polling(client, queues).await;
    Ok(())
}
