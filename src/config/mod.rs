//! # Configuration Management Module
//!
//! Type-safe configuration for the webtiles client, loaded from TOML with
//! defaults for every field and validation on load.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - endpoint, credentials, compression and heartbeat
//! - [`DispatchConfig`] - settle timeouts, narration cadence, message log size
//! - [`GameConfig`] - character choices used when starting a game
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use crawlgate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Write a starter file, then load it back (env overrides + validation)
//!     Config::create_default("crawlgate.toml").await?;
//!     let config = Config::load("crawlgate.toml").await?;
//!     println!("Server: {}", config.server.url);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! url = "ws://localhost:8080/socket"
//! username = "dcssai"
//! password = "dcssai"
//! compression_enabled = true
//! heartbeat_interval_ms = 10000
//!
//! [dispatch]
//! settle_timeout_ms = 5000
//! narrate_interval = 5
//!
//! [game]
//! species = "b"
//! background = "f"
//! weapon = "b"
//! ```
//!
//! ## Environment Integration
//!
//! `CRAWLGATE_SERVER_URL`, `CRAWLGATE_USERNAME` and `CRAWLGATE_PASSWORD`
//! override the file. Precedence: CLI args > Environment > Config file > Defaults.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

pub const ENV_SERVER_URL: &str = "CRAWLGATE_SERVER_URL";
pub const ENV_USERNAME: &str = "CRAWLGATE_USERNAME";
pub const ENV_PASSWORD: &str = "CRAWLGATE_PASSWORD";

/// Heartbeats faster than this would flood the server.
const MIN_HEARTBEAT_MS: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8080/socket`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Accept deflate-compressed binary frames. When false, a binary frame is
    /// treated as malformed and skipped.
    pub compression_enabled: bool,
    /// Interval for the application-level keepalive sent to the server.
    pub heartbeat_interval_ms: u64,
    /// Bound on the TCP + WebSocket handshake and on each login exchange.
    pub connect_timeout_ms: u64,
    /// Try `register` with the same credentials when `login` is refused.
    pub register_if_missing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/socket".to_string(),
            username: "dcssai".to_string(),
            password: "dcssai".to_string(),
            compression_enabled: true,
            heartbeat_interval_ms: 10_000,
            connect_timeout_ms: 10_000,
            register_if_missing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long an action may wait for the server to settle.
    pub settle_timeout_ms: u64,
    /// Settle bound for travel-style actions (auto-explore, interlevel travel, rest).
    pub long_settle_timeout_ms: u64,
    /// Trailing window collected after the settling message arrives.
    pub settle_grace_ms: u64,
    /// For multi-key sequences, a tentative settle (menu, popup, prompt)
    /// only counts once the server has been silent this long.
    pub settle_quiet_ms: u64,
    /// Require a narration every N turn-consuming actions; 0 disables the policy.
    pub narrate_interval: u32,
    /// Number of message log lines retained in the game state.
    pub message_log_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            settle_timeout_ms: 5_000,
            long_settle_timeout_ms: 15_000,
            settle_grace_ms: 100,
            settle_quiet_ms: 400,
            narrate_interval: 5,
            message_log_capacity: 200,
        }
    }
}

impl DispatchConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
    pub fn long_settle_timeout(&self) -> Duration {
        Duration::from_millis(self.long_settle_timeout_ms)
    }
    pub fn settle_grace(&self) -> Duration {
        Duration::from_millis(self.settle_grace_ms)
    }
    pub fn settle_quiet(&self) -> Duration {
        Duration::from_millis(self.settle_quiet_ms)
    }
}

/// Character creation choices. Each value is the key pressed on the
/// corresponding `newgame-choice` screen (e.g. species `b` = Minotaur on a
/// stock server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub species: String,
    pub background: String,
    pub weapon: String,
    /// Game id from the lobby; the first advertised game is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    /// Quit a resumed save and start fresh instead of continuing it.
    pub abandon_stale_saves: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            species: "b".to_string(),
            background: "f".to_string(),
            weapon: "b".to_string(),
            game_id: None,
            abandon_stale_saves: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl ServerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a file, apply environment overrides, validate.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_SERVER_URL) {
            self.server.url = url;
        }
        if let Some(user) = get(ENV_USERNAME) {
            self.server.username = user;
        }
        if let Some(pass) = get(ENV_PASSWORD) {
            self.server.password = pass;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.server.url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            bail!("server.url must be a ws:// or wss:// URL (got '{}')", url);
        }
        if self.server.username.trim().is_empty() {
            bail!("server.username must not be empty");
        }
        if self.server.heartbeat_interval_ms < MIN_HEARTBEAT_MS {
            bail!(
                "server.heartbeat_interval_ms must be >= {} (got {})",
                MIN_HEARTBEAT_MS,
                self.server.heartbeat_interval_ms
            );
        }
        if self.server.connect_timeout_ms == 0 {
            bail!("server.connect_timeout_ms must be > 0");
        }
        if self.dispatch.settle_timeout_ms == 0 {
            bail!("dispatch.settle_timeout_ms must be > 0");
        }
        if self.dispatch.long_settle_timeout_ms < self.dispatch.settle_timeout_ms {
            bail!(
                "dispatch.long_settle_timeout_ms ({}) must be >= settle_timeout_ms ({})",
                self.dispatch.long_settle_timeout_ms,
                self.dispatch.settle_timeout_ms
            );
        }
        if self.dispatch.settle_grace_ms >= self.dispatch.settle_timeout_ms {
            bail!("dispatch.settle_grace_ms must be shorter than settle_timeout_ms");
        }
        if self.dispatch.settle_quiet_ms >= self.dispatch.settle_timeout_ms {
            bail!("dispatch.settle_quiet_ms must be shorter than settle_timeout_ms");
        }
        if self.dispatch.message_log_capacity == 0 {
            bail!("dispatch.message_log_capacity must be > 0");
        }
        for (name, key) in [
            ("species", &self.game.species),
            ("background", &self.game.background),
            ("weapon", &self.game.weapon),
        ] {
            if key.chars().count() > 1 {
                bail!("game.{} must be a single choice key (got '{}')", name, key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.url, "ws://localhost:8080/socket");
        assert_eq!(config.dispatch.narrate_interval, 5);
        assert_eq!(config.dispatch.message_log_capacity, 200);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            url = "wss://crawl.example.org/socket"
            username = "bot"

            [dispatch]
            narrate_interval = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.url, "wss://crawl.example.org/socket");
        assert_eq!(cfg.server.password, "dcssai");
        assert!(cfg.server.compression_enabled);
        assert_eq!(cfg.dispatch.narrate_interval, 0);
        assert_eq!(cfg.dispatch.settle_timeout_ms, 5_000);
        assert_eq!(cfg.game.species, "b");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_win_and_ignore_blank() {
        let mut cfg = Config::default();
        let env: HashMap<&str, &str> = [
            (ENV_SERVER_URL, "ws://10.0.0.2:8080/socket"),
            (ENV_USERNAME, "  "),
            (ENV_PASSWORD, "hunter2"),
        ]
        .into_iter()
        .collect();
        cfg.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.server.url, "ws://10.0.0.2:8080/socket");
        assert_eq!(cfg.server.username, "dcssai");
        assert_eq!(cfg.server.password, "hunter2");
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.server.url = "http://localhost:8080".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.server.heartbeat_interval_ms = 10;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.dispatch.long_settle_timeout_ms = 1_000;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.game.species = "Minotaur".into();
        assert!(cfg.validate().is_err());
    }

    #[tokio::test]
    async fn create_default_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawlgate.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.server.heartbeat_interval_ms, 10_000);
        assert_eq!(loaded.game.background, "f");
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
