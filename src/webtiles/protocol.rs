//! Typed view of the webtiles JSON messages.
//!
//! Inbound objects are classified by their `msg` field with [`decode`]. Kinds
//! the client has no use for (chat, lobby entries, version banners, ...) come
//! back as [`ProtocolMessage::Unrecognized`] so they can be logged and skipped
//! without interpretation.
//!
//! Outbound traffic is a small closed set ([`ClientMessage`]); every keystroke
//! is a [`KeyInput`] that serialises to either an `input` or a `key` message.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message has no \"msg\" field")]
    MissingKind,
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    AuthResponse(AuthResponse),
    GameLinks { game_ids: Vec<String> },
    Lobby { complete: bool },
    GameStarted,
    MapUpdate(MapUpdate),
    StatsUpdate(Box<PlayerUpdate>),
    MessageLogAppend { lines: Vec<String> },
    MenuOpen(MenuData),
    MenuUpdate(MenuChange),
    MenuClose { all: bool },
    PopupOpen(PopupData),
    PopupUpdate(PopupData),
    PopupClose,
    InputModeChange { code: i64 },
    TextPrompt { prompt: String },
    Ping,
    HeartbeatAck,
    SessionClosed(CloseReason),
    Unrecognized { kind: String, raw: Value },
}

impl ProtocolMessage {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &str {
        match self {
            ProtocolMessage::AuthResponse(_) => "auth_response",
            ProtocolMessage::GameLinks { .. } => "game_links",
            ProtocolMessage::Lobby { .. } => "lobby",
            ProtocolMessage::GameStarted => "game_started",
            ProtocolMessage::MapUpdate(_) => "map_update",
            ProtocolMessage::StatsUpdate(_) => "stats_update",
            ProtocolMessage::MessageLogAppend { .. } => "message_log_append",
            ProtocolMessage::MenuOpen(_) => "menu_open",
            ProtocolMessage::MenuUpdate(_) => "menu_update",
            ProtocolMessage::MenuClose { .. } => "menu_close",
            ProtocolMessage::PopupOpen(_) => "popup_open",
            ProtocolMessage::PopupUpdate(_) => "popup_update",
            ProtocolMessage::PopupClose => "popup_close",
            ProtocolMessage::InputModeChange { .. } => "input_mode_change",
            ProtocolMessage::TextPrompt { .. } => "text_prompt",
            ProtocolMessage::Ping => "ping",
            ProtocolMessage::HeartbeatAck => "heartbeat_ack",
            ProtocolMessage::SessionClosed(_) => "session_closed",
            ProtocolMessage::Unrecognized { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub success: bool,
    pub username: Option<String>,
    pub reason: Option<String>,
}

/// Why a game session ended. Exactly one variant per server reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloseReason {
    Death { message: String },
    Quit,
    Win,
    Saved,
    Unknown { reason: String, message: String },
}

impl CloseReason {
    fn from_server(reason: Option<&str>, message: Option<&str>) -> Self {
        let message = message.map(strip_markup).unwrap_or_default();
        match reason {
            Some("dead") | Some("death") => CloseReason::Death { message },
            Some("quit") => CloseReason::Quit,
            Some("won") | Some("win") => CloseReason::Win,
            Some("saved") => CloseReason::Saved,
            other => CloseReason::Unknown {
                reason: other.unwrap_or("unspecified").to_string(),
                message,
            },
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CloseReason::Death { .. } => "death",
            CloseReason::Quit => "quit",
            CloseReason::Win => "win",
            CloseReason::Saved => "saved",
            CloseReason::Unknown { reason, .. } => reason,
        }
    }
}

/// A map message with its run-length positions already resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapUpdate {
    pub clear: bool,
    pub cells: Vec<CellUpdate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    pub x: i32,
    pub y: i32,
    pub glyph: Option<String>,
    pub feature: Option<i64>,
    pub fg: Option<u64>,
    /// `None`: untouched, `Some(None)`: monster left, `Some(Some(..))`: monster data.
    pub monster: Option<Option<MonsterInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MonsterInfo {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub threat: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Hash, PartialOrd, Ord)]
pub struct Position {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// Partial player record; absent fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerUpdate {
    pub hp: Option<i32>,
    pub hp_max: Option<i32>,
    pub mp: Option<i32>,
    pub mp_max: Option<i32>,
    pub ac: Option<i32>,
    pub ev: Option<i32>,
    pub sh: Option<i32>,
    #[serde(rename = "str")]
    pub strength: Option<i32>,
    #[serde(rename = "int")]
    pub intelligence: Option<i32>,
    #[serde(rename = "dex")]
    pub dexterity: Option<i32>,
    pub xl: Option<i32>,
    pub progress: Option<i32>,
    pub place: Option<String>,
    pub depth: Option<i32>,
    pub god: Option<String>,
    pub piety_rank: Option<i32>,
    pub penance: Option<bool>,
    pub gold: Option<i64>,
    pub turn: Option<i64>,
    pub time: Option<i64>,
    pub species: Option<String>,
    pub title: Option<String>,
    pub pos: Option<Position>,
    pub poison_survival: Option<i32>,
    pub weapon_index: Option<i32>,
    pub offhand_index: Option<i32>,
    pub inv: Option<BTreeMap<String, Option<ItemUpdate>>>,
    pub status: Option<Vec<StatusEffect>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub quantity: Option<i64>,
    pub inscription: Option<String>,
    pub useless: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusEffect {
    pub light: Option<String>,
    pub text: Option<String>,
    pub desc: Option<String>,
}

impl StatusEffect {
    pub fn label(&self) -> Option<&str> {
        self.light
            .as_deref()
            .or(self.text.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub text: String,
    /// Heading level; values below 2 are section titles.
    pub level: i64,
    pub hotkey: Option<char>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuData {
    pub tag: String,
    pub title: String,
    pub more: String,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuChange {
    Fields {
        title: Option<String>,
        more: Option<String>,
        items: Option<Vec<MenuItem>>,
    },
    Items {
        chunk_start: usize,
        items: Vec<MenuItem>,
    },
}

/// `ui-push` / `ui-state` payload. Fields absent in an update stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopupData {
    pub kind: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub prompt: Option<String>,
    pub details: Vec<String>,
}

pub fn decode(value: Value) -> Result<ProtocolMessage, DecodeError> {
    let Value::Object(obj) = value else {
        return Err(DecodeError::MissingKind);
    };
    let kind = match obj.get("msg").and_then(Value::as_str) {
        Some(k) => k.to_string(),
        None => return Err(DecodeError::MissingKind),
    };
    let msg = match kind.as_str() {
        "login_success" => ProtocolMessage::AuthResponse(AuthResponse {
            success: true,
            username: str_field(&obj, "username"),
            reason: None,
        }),
        "login_fail" | "register_fail" => ProtocolMessage::AuthResponse(AuthResponse {
            success: false,
            username: None,
            reason: str_field(&obj, "reason").or_else(|| Some(kind.clone())),
        }),
        "set_game_links" => ProtocolMessage::GameLinks {
            game_ids: parse_game_links(obj.get("content").and_then(Value::as_str).unwrap_or("")),
        },
        "go_lobby" => ProtocolMessage::Lobby { complete: false },
        "lobby_complete" => ProtocolMessage::Lobby { complete: true },
        "game_client" | "game_started" => ProtocolMessage::GameStarted,
        "map" => ProtocolMessage::MapUpdate(parse_map(&obj)),
        "player" => {
            let update: PlayerUpdate = serde_json::from_value(Value::Object(obj))
                .map_err(|source| DecodeError::Malformed { kind: kind.clone(), source })?;
            ProtocolMessage::StatsUpdate(Box::new(update))
        }
        "msgs" => ProtocolMessage::MessageLogAppend {
            lines: obj
                .get("messages")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|m| m.get("text").and_then(Value::as_str))
                        .map(|t| strip_markup(t).trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        },
        "menu" => ProtocolMessage::MenuOpen(MenuData {
            tag: str_field(&obj, "tag").unwrap_or_default(),
            title: obj.get("title").map(text_of).unwrap_or_default(),
            more: obj.get("more").map(text_of).unwrap_or_default(),
            items: obj.get("items").map(parse_menu_items).unwrap_or_default(),
        }),
        "update_menu" => ProtocolMessage::MenuUpdate(MenuChange::Fields {
            title: obj.get("title").map(text_of),
            more: obj.get("more").map(text_of),
            items: obj.get("items").map(parse_menu_items),
        }),
        "update_menu_items" => ProtocolMessage::MenuUpdate(MenuChange::Items {
            chunk_start: obj.get("chunk_start").and_then(Value::as_u64).unwrap_or(0) as usize,
            items: obj.get("items").map(parse_menu_items).unwrap_or_default(),
        }),
        "close_menu" => ProtocolMessage::MenuClose { all: false },
        "close_all_menus" => ProtocolMessage::MenuClose { all: true },
        "ui-push" => ProtocolMessage::PopupOpen(parse_popup(&obj)),
        "ui-state" => ProtocolMessage::PopupUpdate(parse_popup(&obj)),
        "ui-pop" => ProtocolMessage::PopupClose,
        "input_mode" => ProtocolMessage::InputModeChange {
            code: obj.get("mode").and_then(Value::as_i64).unwrap_or(-1),
        },
        "init_input" => ProtocolMessage::TextPrompt {
            prompt: obj.get("prompt").map(text_of).unwrap_or_default(),
        },
        "ping" => ProtocolMessage::Ping,
        "pong" => ProtocolMessage::HeartbeatAck,
        "game_ended" => ProtocolMessage::SessionClosed(CloseReason::from_server(
            obj.get("reason").and_then(Value::as_str),
            obj.get("message").and_then(Value::as_str),
        )),
        "close" => ProtocolMessage::SessionClosed(CloseReason::from_server(
            obj.get("reason").and_then(Value::as_str),
            obj.get("message").and_then(Value::as_str),
        )),
        _ => ProtocolMessage::Unrecognized {
            kind: kind.clone(),
            raw: Value::Object(obj),
        },
    };
    Ok(msg)
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Server text fields are either a plain string or `{"text": ..}`.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => strip_markup(s),
        Value::Object(o) => o
            .get("text")
            .and_then(Value::as_str)
            .map(strip_markup)
            .unwrap_or_default(),
        Value::Null => String::new(),
        other => strip_markup(&other.to_string()),
    }
}

/// Extract ids from lobby HTML such as `<a href="#play-dcss-web-trunk">`.
fn parse_game_links(content: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find("#play-") {
        let after = &rest[start + "#play-".len()..];
        match after.find('"') {
            Some(end) if end > 0 => {
                let id = &after[..end];
                if !ids.iter().any(|known| known == id) {
                    ids.push(id.to_string());
                }
                rest = &after[end..];
            }
            Some(end) => rest = &after[end..],
            None => break,
        }
    }
    ids
}

fn parse_map(obj: &Map<String, Value>) -> MapUpdate {
    let clear = obj.get("clear").and_then(Value::as_bool).unwrap_or(false);
    let mut cells = Vec::new();
    let (mut cur_x, mut cur_y): (Option<i64>, Option<i64>) = (None, None);
    for cell in obj.get("cells").and_then(Value::as_array).into_iter().flatten() {
        if let Some(x) = cell.get("x").and_then(Value::as_i64) {
            cur_x = Some(x);
        }
        if let Some(y) = cell.get("y").and_then(Value::as_i64) {
            cur_y = Some(y);
        }
        let (Some(x), Some(y)) = (cur_x, cur_y) else {
            continue;
        };
        let monster = match cell.get("mon") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(v) => Some(Some(serde_json::from_value::<MonsterInfo>(v.clone()).unwrap_or_default())),
        };
        cells.push(CellUpdate {
            x: x as i32,
            y: y as i32,
            glyph: cell.get("g").and_then(Value::as_str).map(str::to_string),
            feature: cell.get("f").and_then(Value::as_i64),
            fg: cell.get("fg").and_then(parse_fg),
            monster,
        });
        cur_x = Some(x + 1);
    }
    MapUpdate { clear, cells }
}

/// Foreground tile flags arrive as a number or as `[lo, hi]` 32-bit halves.
fn parse_fg(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_i64().map(|v| v as u64)),
        Value::Array(parts) => {
            let lo = parts.first().and_then(Value::as_u64).unwrap_or(0) & 0xFFFF_FFFF;
            let hi = parts.get(1).and_then(Value::as_u64).unwrap_or(0);
            Some((hi << 32) | lo)
        }
        _ => None,
    }
}

fn parse_menu_items(value: &Value) -> Vec<MenuItem> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| MenuItem {
                    text: item.get("text").map(text_of).unwrap_or_default(),
                    level: item.get("level").and_then(Value::as_i64).unwrap_or(2),
                    hotkey: item
                        .get("hotkeys")
                        .and_then(Value::as_array)
                        .and_then(|keys| keys.first())
                        .and_then(|k| match k {
                            Value::Number(n) => n.as_u64().and_then(|c| char::from_u32(c as u32)),
                            Value::String(s) => s.chars().next(),
                            _ => None,
                        }),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_popup(obj: &Map<String, Value>) -> PopupData {
    let details = ["description", "quote", "spells_description", "stats"]
        .iter()
        .filter_map(|field| obj.get(*field))
        .map(text_of)
        .filter(|s| !s.is_empty())
        .collect();
    PopupData {
        kind: str_field(obj, "type"),
        title: obj.get("title").map(text_of),
        body: obj.get("body").map(text_of),
        prompt: obj.get("prompt").map(text_of),
        details,
    }
}

/// Remove `<colour>`-style markup the server embeds in text.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices();
    while let Some((i, ch)) = chars.next() {
        if ch == '<' {
            if let Some(close) = text[i + 1..].find('>') {
                let inner = &text[i + 1..i + 1 + close];
                if !inner.is_empty() && !inner.contains('<') {
                    // Skip the tag body.
                    for _ in 0..inner.chars().count() + 1 {
                        chars.next();
                    }
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Messages the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ClientMessage {
    Login { username: String, password: String },
    Register { username: String, password: String, email: String },
    GoLobby,
    Play { game_id: String },
    Input { text: String },
    Key { keycode: u32 },
    Pong,
}

/// One keystroke as the server understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    /// Printable input, sent as `{"msg":"input","text":..}`.
    Text(String),
    /// Control key, sent as `{"msg":"key","keycode":..}`.
    Code(u32),
}

impl KeyInput {
    pub const ESCAPE: u32 = 27;
    pub const TAB: u32 = 9;

    pub fn ch(c: char) -> Self {
        KeyInput::Text(c.to_string())
    }

    pub fn escape() -> Self {
        KeyInput::Code(Self::ESCAPE)
    }

    pub fn tab() -> Self {
        KeyInput::Code(Self::TAB)
    }

    /// Enter travels as a carriage return on the input channel.
    pub fn enter() -> Self {
        KeyInput::Text("\r".to_string())
    }

    /// Ctrl + letter, e.g. `ctrl('q')` = keycode 17. Anything other than an
    /// ASCII letter has no control code and is sent as plain input.
    pub fn ctrl(letter: char) -> Self {
        if !letter.is_ascii_alphabetic() {
            return KeyInput::ch(letter);
        }
        let lower = letter.to_ascii_lowercase();
        KeyInput::Code(lower as u32 - 'a' as u32 + 1)
    }

    pub fn to_message(&self) -> ClientMessage {
        match self {
            KeyInput::Text(text) => ClientMessage::Input { text: text.clone() },
            KeyInput::Code(keycode) => ClientMessage::Key { keycode: *keycode },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn game_ended_reasons_map_to_distinct_variants() {
        let death = decode(json!({"msg":"game_ended","reason":"dead","message":"Killed by a <red>jackal</red>"})).unwrap();
        assert_eq!(
            death,
            ProtocolMessage::SessionClosed(CloseReason::Death { message: "Killed by a jackal".into() })
        );
        let quit = decode(json!({"msg":"game_ended","reason":"quit"})).unwrap();
        assert_eq!(quit, ProtocolMessage::SessionClosed(CloseReason::Quit));
        let won = decode(json!({"msg":"game_ended","reason":"won"})).unwrap();
        assert_eq!(won, ProtocolMessage::SessionClosed(CloseReason::Win));
        let odd = decode(json!({"msg":"close"})).unwrap();
        assert!(matches!(
            odd,
            ProtocolMessage::SessionClosed(CloseReason::Unknown { ref reason, .. }) if reason == "unspecified"
        ));
    }

    #[test]
    fn map_cells_advance_x_implicitly() {
        let msg = decode(json!({"msg":"map","clear":true,"cells":[
            {"g":"#"},
            {"x":3,"y":5,"g":"."},
            {"g":"@","mon":null},
            {"g":"j","mon":{"id":7,"name":"jackal","threat":1},"fg":[1048576,0]},
            {"x":0,"y":6,"g":">"}
        ]}))
        .unwrap();
        let ProtocolMessage::MapUpdate(map) = msg else { panic!("expected map") };
        assert!(map.clear);
        let coords: Vec<_> = map.cells.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(3, 5), (4, 5), (5, 5), (0, 6)]);
        assert_eq!(map.cells[1].monster, Some(None));
        assert_eq!(map.cells[2].fg, Some(0x0010_0000));
        assert_eq!(
            map.cells[2].monster.clone().flatten().and_then(|m| m.name),
            Some("jackal".into())
        );
    }

    #[test]
    fn player_update_keeps_absent_fields_empty() {
        let msg = decode(json!({"msg":"player","hp":12,"str":14,"pos":{"x":4,"y":9},
            "inv":{"0":{"name":"a +0 hand axe","quantity":1},"3":null}})).unwrap();
        let ProtocolMessage::StatsUpdate(p) = msg else { panic!("expected player") };
        assert_eq!(p.hp, Some(12));
        assert_eq!(p.strength, Some(14));
        assert_eq!(p.mp, None);
        assert_eq!(p.pos, Some(Position { x: 4, y: 9 }));
        let inv = p.inv.unwrap();
        assert_eq!(inv.get("3"), Some(&None));
    }

    #[test]
    fn malformed_player_is_an_error_not_a_panic() {
        let err = decode(json!({"msg":"player","hp":"lots"})).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
        assert!(matches!(decode(json!({"hp":1})), Err(DecodeError::MissingKind)));
    }

    #[test]
    fn unknown_kinds_are_preserved() {
        let msg = decode(json!({"msg":"chat","content":"hi"})).unwrap();
        match msg {
            ProtocolMessage::Unrecognized { kind, raw } => {
                assert_eq!(kind, "chat");
                assert_eq!(raw["content"], "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn game_links_are_extracted_once_each() {
        let html = r##"<a href="#play-dcss-git">trunk</a> <a href="#play-dcss-0.31">0.31</a> <a href="#play-dcss-git">again</a>"##;
        let msg = decode(json!({"msg":"set_game_links","content":html})).unwrap();
        assert_eq!(
            msg,
            ProtocolMessage::GameLinks { game_ids: vec!["dcss-git".into(), "dcss-0.31".into()] }
        );
    }

    #[test]
    fn menu_titles_accept_string_or_object() {
        let msg = decode(json!({"msg":"menu","tag":"inventory","title":{"text":"<w>Inventory</w>"},
            "items":[{"text":"Hand Weapons","level":1},{"text":"a - a club","hotkeys":[97]}]}))
        .unwrap();
        let ProtocolMessage::MenuOpen(menu) = msg else { panic!("expected menu") };
        assert_eq!(menu.title, "Inventory");
        assert_eq!(menu.items[1].hotkey, Some('a'));
        assert_eq!(menu.items[0].level, 1);
    }

    #[test]
    fn strip_markup_leaves_plain_angle_brackets() {
        assert_eq!(strip_markup("<lightred>You die...</lightred>"), "You die...");
        assert_eq!(strip_markup("a < b"), "a < b");
        assert_eq!(strip_markup("stairs <"), "stairs <");
    }

    #[test]
    fn keys_serialize_to_wire_shape() {
        let quit = serde_json::to_value(KeyInput::ctrl('Q').to_message()).unwrap();
        assert_eq!(quit, json!({"msg":"key","keycode":17}));
        let enter = serde_json::to_value(KeyInput::enter().to_message()).unwrap();
        assert_eq!(enter, json!({"msg":"input","text":"\r"}));
        let lobby = serde_json::to_value(ClientMessage::GoLobby).unwrap();
        assert_eq!(lobby, json!({"msg":"go_lobby"}));
    }

    #[test]
    fn ctrl_only_maps_letters() {
        assert_eq!(KeyInput::ctrl('a'), KeyInput::Code(1));
        assert_eq!(KeyInput::ctrl('Z'), KeyInput::Code(26));
        assert_eq!(KeyInput::ctrl('1'), KeyInput::ch('1'));
        assert_eq!(KeyInput::ctrl('['), KeyInput::ch('['));
    }
}
