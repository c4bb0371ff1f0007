//! # Search Relay
//!
//! A Telegram front-end that relays free-text search queries to an upstream
//! search API and renders its loosely-typed JSON answer as an ordered series
//! of chat messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ Telegram │──▶│ Dispatcher │──▶│ Upstream │──▶│ Normalize │──▶│  Render  │
//! │ polling  │   │ (per chat) │   │  client  │   │           │   │          │
//! └──────────┘   └─────┬──────┘   └──────────┘   └───────────┘   └────┬─────┘
//!                      │                                              │
//!                      ▼                                              │
//!                ┌──────────┐◀────────────── messages ────────────────┘
//!                │ Gateway  │
//!                └──────────┘
//! ```
//!
//! An independent health listener answers liveness probes.
//!
//! ## Quick Start
//!
//! ```bash
//! BOT_TOKEN=123:abc API_TOKEN=secret PORT=8080 relay serve
//! relay query "+79001234567"     # one-off query printed to stdout
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Pipeline data types |
//! | [`error`] | Error taxonomy |
//! | [`upstream`] | Search API client |
//! | [`normalize`] | Payload → report |
//! | [`render`] | Report → messages |
//! | [`dispatch`] | Per-query orchestration |
//! | [`gateway`] | Outbound message trait, console gateway |
//! | [`telegram`] | Telegram Bot API adapter |
//! | [`bot`] | Update loop and per-chat workers |
//! | [`health`] | Liveness probe listener |
//! | [`logging`] | `tracing` subscriber setup |

pub mod bot;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod health;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod render;
pub mod telegram;
pub mod upstream;
