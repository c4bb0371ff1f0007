//! Bot runtime tests: per-chat workers and a full run against stand-in
//! Telegram and upstream servers.

use anyhow::Result;
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use search_relay::bot::{self, ChatQueues};
use search_relay::config::{BotConfig, Config, UpstreamConfig};
use search_relay::dispatch::Dispatcher;
use search_relay::gateway::MessageGateway;
use search_relay::models::{ChatId, Query, RenderedMessage, UpstreamResult};
use search_relay::upstream::SearchBackend;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

const TOKEN: &str = "TEST";

// ─── Helpers ────────────────────────────────────────────────────────

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Polls `check` until it returns true or the deadline passes.
async fn wait_for(deadline: Duration, check: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Stand-in Telegram Bot API.
#[derive(Clone, Default)]
struct FakeTelegram {
    updates: Arc<Mutex<VecDeque<Vec<Value>>>>,
    sent: Arc<Mutex<Vec<Value>>>,
    reject_token: bool,
}

impl FakeTelegram {
    fn with_updates(batches: Vec<Vec<Value>>) -> Self {
        Self {
            updates: Arc::new(Mutex::new(batches.into())),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_to(&self, chat: i64) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|m| m["chat_id"] == json!(chat))
            .collect()
    }

    fn router(self) -> Router {
        Router::new()
            .route(&format!("/bot{}/getMe", TOKEN), post(fake_get_me))
            .route(&format!("/bot{}/getUpdates", TOKEN), post(fake_get_updates))
            .route(&format!("/bot{}/sendMessage", TOKEN), post(fake_send_message))
            .with_state(self)
    }
}

async fn fake_get_me(State(tg): State<FakeTelegram>) -> (StatusCode, Json<Value>) {
    if tg.reject_token {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"ok": false, "error_code": 401, "description": "Unauthorized"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"ok": true, "result": {"id": 1, "is_bot": true, "username": "TestBot"}})),
    )
}

async fn fake_get_updates(State(tg): State<FakeTelegram>) -> Json<Value> {
    let batch = tg.updates.lock().unwrap().pop_front();
    match batch {
        Some(updates) => Json(json!({"ok": true, "result": updates})),
        None => {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Json(json!({"ok": true, "result": []}))
        }
    }
}

async fn fake_send_message(
    State(tg): State<FakeTelegram>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    tg.sent.lock().unwrap().push(body.clone());
    let markdown = body.get("parse_mode").is_some();
    let text = body["text"].as_str().unwrap_or("");
    if markdown && text.contains("REJECT") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities"
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"ok": true, "result": {"message_id": 1}})),
    )
}

fn text_update(update_id: i64, chat: i64, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {"message_id": update_id, "chat": {"id": chat, "type": "private"}, "text": text}
    })
}

async fn spawn_upstream(payload: Value) -> String {
    let app = Router::new().route(
        "/",
        post(move || {
            let payload = payload.clone();
            async move { Json(payload) }
        }),
    );
    format!("{}/", spawn(app).await)
}

fn config(telegram: String, upstream: String) -> Config {
    Config {
        bot: BotConfig {
            token: Some(TOKEN.to_string()),
            api_url: telegram,
            poll_timeout_secs: 1,
            ..BotConfig::default()
        },
        upstream: UpstreamConfig {
            url: upstream,
            timeout_secs: 5,
            ..UpstreamConfig::default()
        },
        ..Config::default()
    }
}

// ─── Full runs ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bot_answers_queries_in_order() {
    let telegram = FakeTelegram::with_updates(vec![vec![
        text_update(1, 100, "/start"),
        text_update(2, 100, "user@example.com"),
        text_update(3, 200, "   "),
        json!({"update_id": 4, "message": {"message_id": 4, "chat": {"id": 300}, "sticker": {}}}),
    ]]);
    let telegram_url = spawn(telegram.clone().router()).await;
    let upstream_url = spawn_upstream(json!({"List": {
        "1win": {"Data": [{"Email": "a@example.com", "Age": 30}]},
        "Other": {"Data": []}
    }}))
    .await;

    let cfg = config(telegram_url, upstream_url);
    let running = tokio::spawn(async move { bot::run_bot(&cfg).await });

    let done = wait_for(Duration::from_secs(10), || {
        telegram.sent_to(100).len() == 6 && telegram.sent_to(200).len() == 1
    })
    .await;
    running.abort();
    assert!(done, "sent so far: {:#?}", telegram.sent());

    let chat_100 = telegram.sent_to(100);
    let texts: Vec<&str> = chat_100.iter().map(|m| m["text"].as_str().unwrap()).collect();
    assert!(texts[0].contains("Welcome"));
    assert_eq!(texts[1], "📁 *Database:* `Smarty Sunny`");
    assert_eq!(
        texts[2],
        "```js\n{\n  Email: \"a@example.com\"\n  Age: 30\n}\n```"
    );
    assert_eq!(texts[3], "📁 *Database:* `Other`");
    assert_eq!(texts[4], "⚠️ Empty database entry.");
    assert_eq!(texts[5], "🔴 *Credit by Smarty Sunny*");
    for message in &chat_100 {
        assert_eq!(message["parse_mode"], json!("Markdown"));
    }

    let chat_200 = telegram.sent_to(200);
    assert_eq!(
        chat_200[0]["text"],
        json!("⚠️ Please send a phone number or email to search.")
    );
    assert!(chat_200[0].get("parse_mode").is_none());

    assert!(telegram.sent_to(300).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejected_markdown_is_resent_as_plain_text() {
    let telegram = FakeTelegram::with_updates(vec![vec![text_update(1, 7, "q")]]);
    let telegram_url = spawn(telegram.clone().router()).await;
    let upstream_url = spawn_upstream(json!({"List": {"REJECT_`db": {"Data": []}}})).await;

    let cfg = config(telegram_url, upstream_url);
    let running = tokio::spawn(async move { bot::run_bot(&cfg).await });

    // header (rejected) + header (plain) + empty notice + footer
    let done = wait_for(Duration::from_secs(10), || telegram.sent_to(7).len() == 4).await;
    running.abort();
    assert!(done, "sent so far: {:#?}", telegram.sent());

    let sent = telegram.sent_to(7);
    assert_eq!(sent[0]["parse_mode"], json!("Markdown"));
    assert!(sent[1].get("parse_mode").is_none());
    assert_eq!(sent[1]["text"], sent[0]["text"]);
    assert_eq!(sent[2]["text"], json!("⚠️ Empty database entry."));
    assert_eq!(sent[3]["text"], json!("🔴 *Credit by Smarty Sunny*"));
}

#[tokio::test]
async fn test_bad_token_fails_fast() {
    let telegram = FakeTelegram {
        reject_token: true,
        ..FakeTelegram::default()
    };
    let telegram_url = spawn(telegram.router()).await;

    let cfg = config(telegram_url, "http://127.0.0.1:9/".to_string());
    let err = bot::run_bot(&cfg).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Unauthorized"));
}

#[tokio::test]
async fn test_missing_token_fails_fast() {
    let mut cfg = config("http://127.0.0.1:9".to_string(), "http://127.0.0.1:9/".to_string());
    cfg.bot.token = None;
    assert!(bot::run_bot(&cfg).await.is_err());
}

// ─── Per-chat workers ───────────────────────────────────────────────

/// Sleeps longer for earlier queries so unserialized handling would reorder.
struct DelayBackend;

#[async_trait]
impl SearchBackend for DelayBackend {
    async fn fetch(&self, query: &Query) -> UpstreamResult {
        let n: u64 = query.as_str().parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(100 - n * 20)).await;
        Ok(json!({"Error code": query.as_str()}))
    }
}

#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<(ChatId, String)>>,
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send(&self, chat: ChatId, message: &RenderedMessage) -> Result<()> {
        self.sent.lock().unwrap().push((chat, message.text.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn test_same_chat_is_serialized() {
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(DelayBackend), gateway.clone()));
    let mut queues = ChatQueues::new(dispatcher, Duration::from_secs(5));

    for n in 0..5 {
        queues.submit(ChatId(1), n.to_string());
    }
    queues.submit(ChatId(2), "4".to_string());

    let done = wait_for(Duration::from_secs(5), || gateway.sent.lock().unwrap().len() == 6).await;
    assert!(done);

    let sent = gateway.sent.lock().unwrap();
    let chat_1: Vec<&str> = sent
        .iter()
        .filter(|(chat, _)| *chat == ChatId(1))
        .map(|(_, text)| text.as_str())
        .collect();
    assert_eq!(
        chat_1,
        vec![
            "🚫 API Error: 0",
            "🚫 API Error: 1",
            "🚫 API Error: 2",
            "🚫 API Error: 3",
            "🚫 API Error: 4"
        ]
    );
    // Chat 2 did not wait behind chat 1's queue.
    let position = sent.iter().position(|(chat, _)| *chat == ChatId(2)).unwrap();
    assert!(position < 5);
}

#[tokio::test]
async fn test_idle_workers_exit_and_restart() {
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(DelayBackend), gateway.clone()));
    let mut queues = ChatQueues::new(dispatcher, Duration::from_millis(50));

    queues.submit(ChatId(1), "4".to_string());
    assert_eq!(queues.active_workers(), 1);

    let idle = wait_for(Duration::from_secs(5), || queues.active_workers() == 0).await;
    assert!(idle);
    queues.prune();

    queues.submit(ChatId(1), "4".to_string());
    let done = wait_for(Duration::from_secs(5), || gateway.sent.lock().unwrap().len() == 2).await;
    assert!(done);
}
