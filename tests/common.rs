//! Test utilities & fixtures.
//! Provides a scripted in-process webtiles server and a matching client config.
#![allow(dead_code)]

use crawlgate::config::Config;
use crawlgate::webtiles::codec::FrameEncoder;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "hunter2";
pub const GAME_ID: &str = "dcss-web-trunk";

/// Maps one client message to the server messages sent back as a single batch.
pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

pub struct FakeServer {
    pub url: String,
    compress: bool,
    received: Arc<Mutex<Vec<Value>>>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(compress: bool, responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, compress, responder.clone(), log.clone()));
            }
        });
        Self {
            url: format!("ws://{}/socket", addr),
            compress,
            received,
            task,
        }
    }

    /// Client config pointed at this server with short test timings.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.server.url = self.url.clone();
        cfg.server.username = USERNAME.to_string();
        cfg.server.password = PASSWORD.to_string();
        cfg.server.compression_enabled = self.compress;
        cfg.server.connect_timeout_ms = 2_000;
        cfg.dispatch.settle_timeout_ms = 1_000;
        cfg.dispatch.long_settle_timeout_ms = 2_000;
        cfg.dispatch.settle_grace_ms = 20;
        cfg.dispatch.settle_quiet_ms = 100;
        cfg.dispatch.narrate_interval = 0;
        cfg.game.abandon_stale_saves = false;
        cfg
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_kind(&self, kind: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|m| m["msg"] == kind)
            .collect()
    }

    /// Text of every `input` message, in order.
    pub fn inputs(&self) -> Vec<String> {
        self.received_kind("input")
            .iter()
            .filter_map(|m| m["text"].as_str().map(str::to_string))
            .collect()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, compress: bool, responder: Responder, log: Arc<Mutex<Vec<Value>>>) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let mut encoder = FrameEncoder::new();
    while let Some(Ok(frame)) = source.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        log.lock().unwrap().push(value.clone());
        let replies = responder(&value);
        if replies.is_empty() {
            continue;
        }
        let batch = json!({ "msgs": replies }).to_string();
        let out = if compress {
            Message::Binary(encoder.encode(&batch).expect("deflate"))
        } else {
            Message::Text(batch)
        };
        if sink.send(out).await.is_err() {
            break;
        }
    }
}

/// Lobby and login handling shared by every scenario; `play` resumes a saved
/// game and anything else goes to `game`.
pub fn webtiles_server<F>(game: F) -> Responder
where
    F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
{
    lobby_server(|_| resumed_game(), game)
}

/// Like [`webtiles_server`] with a custom answer to `play`.
pub fn lobby_server<P, F>(play: P, game: F) -> Responder
where
    P: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
{
    Arc::new(move |msg| match msg["msg"].as_str().unwrap_or("") {
        "login" if msg["password"] == PASSWORD => vec![
            json!({"msg": "login_success", "username": USERNAME}),
            json!({"msg": "set_game_links",
                   "content": format!("<a href=\"#play-{}\">Play trunk</a>", GAME_ID)}),
        ],
        "login" => vec![json!({"msg": "login_fail", "reason": "Invalid password"})],
        "register" => vec![json!({"msg": "register_fail", "reason": "User already exists"})],
        "go_lobby" => vec![json!({"msg": "lobby_complete"})],
        "play" => play(msg),
        "pong" => Vec::new(),
        _ => game(msg),
    })
}

/// A saved game picked up where it left off: player at (2,2), turn 10.
pub fn resumed_game() -> Vec<Value> {
    vec![
        json!({"msg": "game_client"}),
        json!({"msg": "player", "hp": 18, "hp_max": 18, "mp": 1, "mp_max": 1,
               "xl": 1, "place": "Dungeon", "depth": 1, "turn": 10, "time": 100,
               "species": "Minotaur", "title": "Fighter", "pos": {"x": 2, "y": 2},
               "inv": {"0": {"name": "a +0 battleaxe", "quantity": 1}}, "weapon_index": 0}),
        json!({"msg": "map", "clear": true, "cells": [
            {"x": 0, "y": 1, "g": "#"}, {"g": "."}, {"g": "."}, {"g": "#"},
            {"x": 0, "y": 2, "g": "#"}, {"g": "."}, {"g": "@"}, {"g": ">"},
        ]}),
        json!({"msg": "input_mode", "mode": 1}),
    ]
}

/// Reply for one step north from (2,2).
pub fn moved_north() -> Vec<Value> {
    vec![
        json!({"msg": "player", "turn": 11, "time": 110, "pos": {"x": 2, "y": 1}}),
        json!({"msg": "map", "cells": [
            {"x": 2, "y": 1, "g": "@"}, {"x": 2, "y": 2, "g": "."},
        ]}),
        json!({"msg": "msgs", "messages": [{"text": "You hear a <yellow>distant</yellow> door creak."}]}),
        json!({"msg": "input_mode", "mode": 1}),
    ]
}

const CHOICE_TITLES: [&str; 3] = ["Select your species", "Select your background", "Select your weapon"];

/// One character creation screen; `step` counts screens already answered.
pub fn choice_screen(step: usize) -> Value {
    json!({"msg": "ui-push", "type": "newgame-choice",
           "title": CHOICE_TITLES[step.min(CHOICE_TITLES.len() - 1)]})
}

/// Number of screens [`choice_screen`] walks through.
pub const CHOICE_SCREENS: usize = CHOICE_TITLES.len();

/// A freshly created character at turn 0.
pub fn fresh_game() -> Vec<Value> {
    vec![
        json!({"msg": "ui-pop"}),
        json!({"msg": "player", "hp": 20, "hp_max": 20, "xl": 1, "place": "Dungeon", "depth": 1,
               "turn": 0, "species": "Minotaur", "title": "Fighter", "pos": {"x": 1, "y": 1}}),
        json!({"msg": "map", "clear": true, "cells": [
            {"x": 0, "y": 1, "g": "#"}, {"g": "@"}, {"g": "."},
        ]}),
        json!({"msg": "input_mode", "mode": 1}),
    ]
}
