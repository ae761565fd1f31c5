//! # crawlgate - gated webtiles client for Dungeon Crawl Stone Soup
//!
//! crawlgate connects to a DCSS webtiles server, keeps an authoritative model
//! of the running game, and exposes a small set of named capabilities that an
//! external agent loop can call one at a time.
//!
//! ## Features
//!
//! - **Webtiles transport**: WebSocket login, deflate frame decoding, batched
//!   message splitting and an application heartbeat
//! - **Session state**: stats, inventory, message log, level map, input mode
//!   and the single open menu/popup/prompt, applied once per message in order
//! - **Single-flight dispatch**: one action in flight, refused up front when a
//!   menu or prompt is open, the session ended or the link is down
//! - **Capability surface**: free queries, meta actions and turn actions with a
//!   uniform `{ok, state_snapshot, messages, error}` response
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crawlgate::client::CrawlClient;
//! use crawlgate::config::Config;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("crawlgate.toml").await?;
//!     let client = CrawlClient::connect(config).await?;
//!     client.start_game().await?;
//!
//!     let resp = client.capabilities().invoke("auto_explore", &json!({})).await;
//!     println!("{}", serde_json::to_string_pretty(&resp)?);
//!
//!     client.teardown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`webtiles`] - WebSocket transport, frame codec and message types
//! - [`game`] - session state and text views
//! - [`dispatch`] - actions, settlement and the narration policy
//! - [`capability`] - the named operation catalogue
//! - [`client`] - owned client tying the pieces together
//! - [`config`] - configuration management and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Capabilities    │ ← Named operations for the agent loop
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Dispatcher      │ ← Gate, keystrokes, settlement
//! └─────────────────┘
//!          │   ▲ events
//! ┌─────────────────┐
//! │ Session State   │ ← Applied by the receive loop
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Transport       │ ← WebSocket reader/writer tasks
//! └─────────────────┘
//! ```

pub mod capability;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod game;
pub mod logutil;
pub mod metrics;
pub mod webtiles;
