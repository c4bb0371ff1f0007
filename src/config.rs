//! TOML configuration with environment overrides.
//!
//! The file is optional: every field has a default except the bot token,
//! which is only required by `relay serve`. Secrets are normally supplied
//! through the environment rather than written into the file:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `BOT_TOKEN` | `bot.token` |
//! | `API_TOKEN` | `upstream.token` |
//! | `PORT` | `health.bind` (as `0.0.0.0:<PORT>`) |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_bot_api_url")]
    pub api_url: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_worker_idle_secs")]
    pub worker_idle_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_bot_api_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
            worker_idle_secs: default_worker_idle_secs(),
        }
    }
}

fn default_bot_api_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_poll_timeout_secs() -> u64 {
    30
}
fn default_worker_idle_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    #[serde(default = "default_upstream_token")]
    pub token: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            token: default_upstream_token(),
            limit: default_limit(),
            lang: default_lang(),
            timeout_secs: default_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_upstream_url() -> String {
    "https://leakosintapi.com/".to_string()
}
fn default_upstream_token() -> String {
    "demo_api_token".to_string()
}
fn default_limit() -> u32 {
    300
}
fn default_lang() -> String {
    "ru".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_max_response_bytes() -> usize {
    8 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HealthConfig {
    /// Listener address. The probe is disabled when unset.
    #[serde(default)]
    pub bind: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Applies `BOT_TOKEN`, `API_TOKEN` and `PORT` from `lookup`.
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.bot.token = Some(token);
        }
        if let Some(token) = lookup("API_TOKEN").filter(|t| !t.is_empty()) {
            self.upstream.token = token;
        }
        if let Some(port) = lookup("PORT").filter(|p| !p.is_empty()) {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("PORT value is not an integer: {}", port))?;
            self.health.bind = Some(format!("0.0.0.0:{}", port));
        }
        Ok(())
    }

    /// Checks the invariants every command relies on.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.url.trim().is_empty() {
            anyhow::bail!("upstream.url must not be empty");
        }
        if self.upstream.limit == 0 {
            anyhow::bail!("upstream.limit must be >= 1");
        }
        if self.upstream.timeout_secs == 0 {
            anyhow::bail!("upstream.timeout_secs must be >= 1");
        }
        if self.upstream.max_response_bytes == 0 {
            anyhow::bail!("upstream.max_response_bytes must be >= 1");
        }
        if self.bot.poll_timeout_secs == 0 {
            anyhow::bail!("bot.poll_timeout_secs must be >= 1");
        }
        Ok(())
    }

    /// Returns the bot token, failing if it was never configured.
    pub fn bot_token(&self) -> Result<&str> {
        match self.bot.token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => anyhow::bail!("bot token is not set (use BOT_TOKEN or bot.token)"),
        }
    }
}

/// Parses a config file without applying environment overrides.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Loads the config file, applies the process environment, and validates.
///
/// When `path` does not exist and `required` is false the built-in defaults
/// are used instead.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    let mut config = if path.exists() || required {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::default()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
