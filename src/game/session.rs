//! Session state: the single reconciliation point for server messages.
//!
//! The transport's receive loop is the only writer. Every decoded message goes
//! through [`SessionState::apply`] exactly once, in arrival order, and is then
//! forwarded to the dispatcher as an [`InboundEvent`] tagged with whether it
//! settles an in-flight action.
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use super::state::{GameState, Item, PlayerStats};
use super::ui::{ActiveUi, InputMode, Menu, Prompt, PromptKind, UiState};
use crate::logutil::escape_log;
use crate::webtiles::protocol::{CloseReason, ProtocolMessage};

pub type SharedSession = Arc<RwLock<SessionState>>;

/// Whether a message ends the wait of an in-flight action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Pending,
    Settled,
}

#[derive(Debug)]
pub enum InboundEvent {
    Message {
        message: ProtocolMessage,
        settle: Settle,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub game: GameState,
    pub ui: UiState,
    /// Set once the server starts a game, cleared when it ends.
    pub in_game: bool,
    pub game_ids: Vec<String>,
    pub username: Option<String>,
    message_log_capacity: usize,
}

impl SessionState {
    pub fn new(message_log_capacity: usize) -> Self {
        Self {
            game: GameState::new(message_log_capacity),
            ui: UiState::default(),
            in_game: false,
            game_ids: Vec::new(),
            username: None,
            message_log_capacity,
        }
    }

    pub fn shared(message_log_capacity: usize) -> SharedSession {
        Arc::new(RwLock::new(Self::new(message_log_capacity)))
    }

    /// Apply one message and classify it for the dispatcher.
    pub fn apply(&mut self, msg: &ProtocolMessage) -> Settle {
        if self.game.is_ended() && !self.accepts_after_end(msg) {
            debug!("Ignoring {} after session end", msg.kind());
            return Settle::Pending;
        }
        match msg {
            ProtocolMessage::AuthResponse(auth) => {
                if auth.success {
                    self.username = auth.username.clone();
                }
                Settle::Pending
            }
            ProtocolMessage::GameLinks { game_ids } => {
                self.game_ids = game_ids.clone();
                Settle::Pending
            }
            ProtocolMessage::GameStarted => {
                info!("Game started; resetting session state");
                self.game = GameState::new(self.message_log_capacity);
                self.ui = UiState::default();
                self.in_game = true;
                Settle::Pending
            }
            ProtocolMessage::MapUpdate(update) => {
                self.game.map.apply(update);
                Settle::Pending
            }
            ProtocolMessage::StatsUpdate(player) => {
                self.game.apply_player(player);
                Settle::Pending
            }
            ProtocolMessage::MessageLogAppend { lines } => {
                for line in lines {
                    debug!("log: {}", escape_log(line));
                }
                self.game.append_log(lines);
                Settle::Pending
            }
            ProtocolMessage::MenuOpen(data) => {
                self.ui.open(ActiveUi::Menu(Menu::from(data.clone())));
                Settle::Settled
            }
            ProtocolMessage::MenuUpdate(change) => {
                if self.ui.update_menu(change.clone()) {
                    Settle::Settled
                } else {
                    debug!("menu update without an open menu");
                    Settle::Pending
                }
            }
            ProtocolMessage::MenuClose { .. } => {
                self.ui.close_menu();
                Settle::Pending
            }
            ProtocolMessage::PopupOpen(data) => {
                self.ui.open(UiState::popup_from(data.clone()));
                Settle::Settled
            }
            ProtocolMessage::PopupUpdate(data) => {
                if self.ui.update_popup(data.clone()) {
                    Settle::Settled
                } else {
                    debug!("popup update without an open popup");
                    Settle::Pending
                }
            }
            ProtocolMessage::PopupClose => {
                self.ui.close_popup();
                Settle::Pending
            }
            ProtocolMessage::InputModeChange { code } => self.apply_mode(*code, None),
            ProtocolMessage::TextPrompt { prompt } => self.apply_mode(7, Some(prompt.clone())),
            ProtocolMessage::SessionClosed(reason) => {
                match reason {
                    CloseReason::Death { message } => {
                        info!("Session closed: death ({})", escape_log(message))
                    }
                    other => info!("Session closed: {}", other.label()),
                }
                self.game.close(reason.clone());
                self.ui.active = None;
                self.in_game = false;
                Settle::Settled
            }
            ProtocolMessage::Lobby { .. }
            | ProtocolMessage::Ping
            | ProtocolMessage::HeartbeatAck
            | ProtocolMessage::Unrecognized { .. } => Settle::Pending,
        }
    }

    pub fn apply_batch(&mut self, batch: &[ProtocolMessage]) -> Vec<Settle> {
        batch.iter().map(|msg| self.apply(msg)).collect()
    }

    /// Once ended, only a new game (and housekeeping) changes anything.
    fn accepts_after_end(&self, msg: &ProtocolMessage) -> bool {
        matches!(
            msg,
            ProtocolMessage::GameStarted
                | ProtocolMessage::GameLinks { .. }
                | ProtocolMessage::AuthResponse(_)
                | ProtocolMessage::MessageLogAppend { .. }
        )
    }

    fn apply_mode(&mut self, code: i64, prompt_text: Option<String>) -> Settle {
        let mode = InputMode::from_code(code);
        self.ui.set_mode(mode);
        match mode {
            InputMode::Traveling => Settle::Pending,
            InputMode::TextPrompt => {
                if self.ui.pending_prompt().is_none() && self.ui.active.is_none() {
                    let text = prompt_text.unwrap_or_else(|| self.game.messages.recent(1).concat());
                    let kind = self.classify_prompt(code, &text);
                    if kind == PromptKind::StatIncrease {
                        info!("Stat increase prompt detected");
                    }
                    self.ui.open(ActiveUi::Prompt(Prompt { kind, text }));
                }
                Settle::Settled
            }
            _ => Settle::Settled,
        }
    }

    fn classify_prompt(&self, code: i64, text: &str) -> PromptKind {
        let offers_stats = |s: &str| s.contains("(S)trength") || s.contains("Increase (S)");
        if offers_stats(text) || self.game.messages.recent(5).iter().any(|l| offers_stats(l)) {
            PromptKind::StatIncrease
        } else if code == 8 {
            PromptKind::YesNo
        } else {
            PromptKind::FreeText
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            in_game: self.in_game,
            turn: self.game.turn(),
            is_dead: self.game.is_dead(),
            is_ended: self.game.is_ended(),
            close_reason: self.game.close_reason().cloned(),
            input_mode: self.ui.mode,
            active_ui: self.ui.active.as_ref().map(UiSummary::from),
            stats: self.game.stats.clone(),
            inventory: self.game.inventory.values().cloned().collect(),
            recent_messages: self.game.messages.recent(5),
        }
    }
}

/// Serializable copy of the state handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub in_game: bool,
    pub turn: i64,
    pub is_dead: bool,
    pub is_ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
    pub input_mode: InputMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_ui: Option<UiSummary>,
    pub stats: PlayerStats,
    pub inventory: Vec<Item>,
    pub recent_messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiSummary {
    Menu { title: String, items: usize },
    Popup { kind: String },
    Prompt { kind: PromptKind, text: String },
}

impl From<&ActiveUi> for UiSummary {
    fn from(ui: &ActiveUi) -> Self {
        match ui {
            ActiveUi::Menu(menu) => UiSummary::Menu {
                title: menu.title.clone(),
                items: menu.items.len(),
            },
            ActiveUi::Popup(popup) => UiSummary::Popup {
                kind: popup.kind.clone(),
            },
            ActiveUi::Prompt(prompt) => UiSummary::Prompt {
                kind: prompt.kind,
                text: prompt.text.clone(),
            },
        }
    }
}

/// Producer half used by the receive loop (and by tests standing in for it).
#[derive(Clone)]
pub struct SessionFeed {
    session: SharedSession,
    events: mpsc::UnboundedSender<InboundEvent>,
}

impl SessionFeed {
    pub fn new(session: SharedSession) -> (Self, mpsc::UnboundedReceiver<InboundEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { session, events }, rx)
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Apply then forward. The write lock is released before forwarding so a
    /// woken dispatcher always observes the applied state.
    pub async fn push(&self, message: ProtocolMessage) {
        let settle = {
            let mut session = self.session.write().await;
            session.apply(&message)
        };
        let _ = self.events.send(InboundEvent::Message { message, settle });
    }

    pub fn disconnected(&self, reason: impl Into<String>) {
        let _ = self.events.send(InboundEvent::Disconnected {
            reason: reason.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webtiles::protocol::{decode, PlayerUpdate, Position};
    use serde_json::json;

    fn msgs(values: Vec<serde_json::Value>) -> Vec<ProtocolMessage> {
        values.into_iter().map(|v| decode(v).unwrap()).collect()
    }

    fn started() -> SessionState {
        let mut s = SessionState::new(50);
        s.apply(&ProtocolMessage::GameStarted);
        s
    }

    #[test]
    fn batch_application_matches_one_at_a_time() {
        let batch = msgs(vec![
            json!({"msg":"player","hp":10,"hp_max":12,"turn":5,"pos":{"x":3,"y":3}}),
            json!({"msg":"map","cells":[{"x":2,"y":3,"g":"#"},{"g":"@"},{"g":">"}]}),
            json!({"msg":"msgs","messages":[{"text":"<yellow>Welcome</yellow>"}]}),
            json!({"msg":"player","turn":7,"pos":{"x":4,"y":3}}),
            json!({"msg":"input_mode","mode":1}),
        ]);
        let mut batched = started();
        batched.apply_batch(&batch);
        let mut single = started();
        for m in &batch {
            single.apply(m);
        }
        assert_eq!(batched.snapshot(), single.snapshot());
        assert_eq!(batched.game.turn(), 7);
        assert_eq!(batched.game.stats.position, Position { x: 4, y: 3 });
        assert_eq!(batched.game.map.glyph_at(Position { x: 4, y: 3 }), Some(">"));
        assert_eq!(batched.ui.mode, InputMode::Ready);
    }

    #[test]
    fn stat_prompt_is_a_prompt_not_a_death() {
        let mut s = started();
        s.apply(&ProtocolMessage::MessageLogAppend {
            lines: vec!["Your experience leads to an increase in your attributes!".into(),
                        "Increase (S)trength, (I)ntelligence, or (D)exterity?".into()],
        });
        assert_eq!(s.apply(&ProtocolMessage::InputModeChange { code: 7 }), Settle::Settled);
        assert_eq!(s.ui.pending_prompt().map(|p| p.kind), Some(PromptKind::StatIncrease));
        assert!(!s.game.is_dead());
        assert!(!s.game.is_ended());
        assert!(s.in_game);
    }

    #[test]
    fn yes_no_prompt_from_code_eight() {
        let mut s = started();
        s.apply(&ProtocolMessage::InputModeChange { code: 8 });
        assert_eq!(s.ui.pending_prompt().map(|p| p.kind), Some(PromptKind::YesNo));
        s.apply(&ProtocolMessage::InputModeChange { code: 1 });
        assert!(s.ui.pending_prompt().is_none());
    }

    #[test]
    fn death_is_terminal_and_ignores_later_updates() {
        let mut s = started();
        s.apply(&ProtocolMessage::StatsUpdate(Box::new(PlayerUpdate { turn: Some(100), ..Default::default() })));
        let settle = s.apply(&ProtocolMessage::SessionClosed(CloseReason::Death {
            message: "Killed by a goblin".into(),
        }));
        assert_eq!(settle, Settle::Settled);
        assert!(s.game.is_dead());
        assert!(!s.in_game);
        s.apply(&ProtocolMessage::StatsUpdate(Box::new(PlayerUpdate { hp: Some(50), ..Default::default() })));
        assert_eq!(s.game.stats.hp, 0);
        // a new game clears the terminal state
        s.apply(&ProtocolMessage::GameStarted);
        assert!(!s.game.is_ended());
        assert_eq!(s.game.turn(), 0);
    }

    #[test]
    fn settle_classification() {
        let mut s = started();
        assert_eq!(s.apply(&ProtocolMessage::InputModeChange { code: 0 }), Settle::Pending);
        assert_eq!(s.apply(&ProtocolMessage::InputModeChange { code: 5 }), Settle::Settled);
        assert_eq!(s.apply(&ProtocolMessage::InputModeChange { code: 4 }), Settle::Settled);
        assert_eq!(
            s.apply(&decode(json!({"msg":"menu","title":"Pick up what?","items":[]})).unwrap()),
            Settle::Settled
        );
        assert_eq!(s.apply(&ProtocolMessage::MenuClose { all: false }), Settle::Pending);
        assert!(s.ui.active.is_none());
        assert_eq!(s.apply(&ProtocolMessage::Ping), Settle::Pending);
    }

    #[tokio::test]
    async fn feed_applies_before_forwarding() {
        let session = SessionState::shared(20);
        let (feed, mut rx) = SessionFeed::new(session.clone());
        feed.push(ProtocolMessage::GameStarted).await;
        feed.push(ProtocolMessage::InputModeChange { code: 1 }).await;
        feed.disconnected("bye");
        assert!(matches!(rx.recv().await, Some(InboundEvent::Message { settle: Settle::Pending, .. })));
        match rx.recv().await {
            Some(InboundEvent::Message { message, settle }) => {
                assert_eq!(message, ProtocolMessage::InputModeChange { code: 1 });
                assert_eq!(settle, Settle::Settled);
                assert_eq!(session.read().await.ui.mode, InputMode::Ready);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(InboundEvent::Disconnected { .. })));
    }
}
