//! # Action Dispatcher
//!
//! Runs one action at a time against the live session.
//!
//! ## Features
//!
//! - **Single flight**: the inbound event receiver sits behind an async mutex;
//!   holding it is the permission to act, so concurrent callers queue in order
//! - **Fail fast**: dead link, ended session, blocking UI and the narration
//!   policy are all checked before a single key is sent
//! - **Settlement**: after sending, waits for a settling message, then keeps
//!   collecting for a short grace window, all under a bounded timeout
//! - **Recovery**: repeated timeouts trigger an automatic resync (escapes plus
//!   a redraw request)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use crawlgate::dispatch::{Action, Direction};
//! # async fn demo(dispatcher: &crawlgate::dispatch::Dispatcher) -> Result<(), crawlgate::dispatch::DispatchError> {
//! let result = dispatcher.dispatch(Action::Move { direction: Direction::North }).await?;
//! println!("turns elapsed: {}", result.turns_elapsed);
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod errors;
pub mod policy;

pub use action::{Action, ActionClass, Direction, KeyPlan, SettleRule, Slot, Stat};
pub use errors::{DispatchError, ErrorCode, ErrorInfo};
pub use policy::{EveryNActions, NarrationPolicy, NoPolicy, ResultSubscriber};

use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{timeout_at, Instant};

use crate::config::{DispatchConfig, GameConfig};
use crate::game::{InboundEvent, InputMode, PromptKind, Settle, SharedSession, StateSnapshot, UiState};
use crate::logutil::escape_log;
use crate::metrics;
use crate::webtiles::protocol::{ClientMessage, KeyInput, ProtocolMessage};
use crate::webtiles::{LinkStatus, Outbound};

/// Consecutive settle timeouts before the dispatcher resyncs on its own.
const RESYNC_AFTER_TIMEOUTS: u32 = 3;
/// Character creation may take several round trips.
const START_TIMEOUT_FACTOR: u32 = 2;
const NEWGAME_CHOICE: &str = "newgame-choice";

/// Outcome of one dispatched action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub action: Action,
    pub class: ActionClass,
    /// Every message received while the action was in flight.
    #[serde(skip)]
    pub messages: Vec<ProtocolMessage>,
    /// Message log lines appended while the action was in flight.
    pub log_lines: Vec<String>,
    pub snapshot: StateSnapshot,
    pub turns_elapsed: i64,
    /// Non-fatal problem detected after settling (e.g. nothing happened).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Character choices for [`Dispatcher::start_game`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub game_id: String,
    pub species: String,
    pub background: String,
    pub weapon: String,
}

impl NewGame {
    pub fn from_config(game_id: impl Into<String>, game: &GameConfig) -> Self {
        Self {
            game_id: game_id.into(),
            species: game.species.clone(),
            background: game.background.clone(),
            weapon: game.weapon.clone(),
        }
    }

    fn choice_keys(&self) -> Vec<char> {
        [&self.species, &self.background, &self.weapon]
            .iter()
            .filter_map(|choice| choice.chars().next())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStart {
    /// True when the server resumed a saved game instead of asking for a
    /// new character.
    pub resumed: bool,
    pub snapshot: StateSnapshot,
}

enum Step {
    Continue,
    Tentative,
    Done,
}

pub struct Dispatcher {
    session: SharedSession,
    events: Mutex<mpsc::UnboundedReceiver<InboundEvent>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    link: LinkStatus,
    config: DispatchConfig,
    policy: Box<dyn NarrationPolicy>,
    subscribers: RwLock<Vec<Arc<dyn ResultSubscriber>>>,
    since_narration: AtomicU32,
    consecutive_timeouts: AtomicU32,
}

impl Dispatcher {
    pub fn new(
        session: SharedSession,
        events: mpsc::UnboundedReceiver<InboundEvent>,
        outbound: mpsc::UnboundedSender<Outbound>,
        link: LinkStatus,
        config: DispatchConfig,
    ) -> Self {
        let policy = policy::from_interval(config.narrate_interval);
        Self {
            session,
            events: Mutex::new(events),
            outbound,
            link,
            config,
            policy,
            subscribers: RwLock::new(Vec::new()),
            since_narration: AtomicU32::new(0),
            consecutive_timeouts: AtomicU32::new(0),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn NarrationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn ResultSubscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn actions_since_narration(&self) -> u32 {
        self.since_narration.load(Ordering::Relaxed)
    }

    /// Reset the narration counter and hand the thought to subscribers.
    pub async fn record_narration(&self, thought: &str) {
        self.since_narration.store(0, Ordering::Relaxed);
        info!("Narration: {}", escape_log(thought));
        for subscriber in self.subscribers.read().await.iter() {
            subscriber.on_narration(thought);
        }
    }

    pub async fn dispatch(&self, action: Action) -> Result<ActionResult, DispatchError> {
        self.dispatch_inner(action, true).await
    }

    /// Run `action` as the second half of a call already counted against the
    /// narration policy, such as travelling to stairs after a missed climb.
    pub async fn dispatch_continuation(&self, action: Action) -> Result<ActionResult, DispatchError> {
        self.dispatch_inner(action, false).await
    }

    async fn dispatch_inner(&self, action: Action, counted: bool) -> Result<ActionResult, DispatchError> {
        let mut events = self.events.lock().await;
        metrics::inc_actions_dispatched();
        let outcome = self.run(&mut events, action, counted).await;
        match &outcome {
            Ok(result) => {
                for subscriber in self.subscribers.read().await.iter() {
                    subscriber.on_result(result);
                }
            }
            Err(e) => debug!("Dispatch failed: {}", e),
        }
        outcome
    }

    async fn run(
        &self,
        events: &mut mpsc::UnboundedReceiver<InboundEvent>,
        action: Action,
        counted: bool,
    ) -> Result<ActionResult, DispatchError> {
        action.validate().map_err(DispatchError::InvalidAction)?;
        self.drain_pending(events)?;
        let class = action.class();

        let (turn_before, log_seq) = {
            let session = self.session.read().await;
            if let Some(reason) = session.game.close_reason() {
                return Err(DispatchError::SessionEnded(reason.label().to_string()));
            }
            if !session.in_game {
                return Err(DispatchError::InvalidAction("no game is in progress".to_string()));
            }
            if !action.is_whitelisted() {
                if let Some(reason) = session.ui.blocker() {
                    metrics::inc_ui_blocks();
                    info!("{} blocked: {}", action.name(), reason);
                    return Err(DispatchError::UiBlocked(reason));
                }
            }
            check_ui_target(&action, &session.ui)?;
            (session.game.turn(), session.game.messages.next_seq())
        };

        if class == ActionClass::Turn {
            if counted {
                let since = self.since_narration.load(Ordering::Relaxed);
                self.policy.check(since).map_err(DispatchError::PolicyDenied)?;
                self.since_narration.fetch_add(1, Ordering::Relaxed);
            }
            metrics::inc_turn_actions();
        }

        let plan = action.key_plan();
        let limit = if action.is_long_running() {
            self.config.long_settle_timeout()
        } else {
            self.config.settle_timeout()
        };
        info!("Dispatching {} ({} key(s))", action.name(), plan.keys.len());
        self.send(Outbound::Keys(plan.keys))?;

        let mut collected = Vec::new();
        let mut settled = self.settle(events, action.settle_rule(), limit, &mut collected).await;
        if settled.is_ok() {
            if let Some(followup) = plan.targeting_followup {
                if self.session.read().await.ui.mode.is_targeting() {
                    debug!("{} entered targeting; sending follow-up", action.name());
                    self.send(Outbound::Keys(followup))?;
                    settled = self.settle(events, SettleRule::Immediate, limit, &mut collected).await;
                }
            }
        }

        if let Err(DispatchError::Timeout { .. }) = &settled {
            metrics::inc_settle_timeouts();
            let count = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("{} did not settle within {:?} ({} in a row)", action.name(), limit, count);
            if count >= RESYNC_AFTER_TIMEOUTS && action != Action::Resync {
                self.auto_resync(events).await?;
            }
            return Err(DispatchError::Timeout {
                action: action.name(),
                waited_ms: limit.as_millis() as u64,
            });
        }
        settled?;
        self.consecutive_timeouts.store(0, Ordering::Relaxed);

        let session = self.session.read().await;
        let turns_elapsed = (session.game.turn() - turn_before).max(0);
        let rejected = class == ActionClass::Turn
            && !matches!(action, Action::SendKeys { .. })
            && turns_elapsed == 0
            && session.ui.mode == InputMode::Ready
            && session.ui.active.is_none()
            && !session.game.is_ended();
        let error = if rejected {
            metrics::inc_server_rejections();
            info!("{} settled without the turn advancing", action.name());
            Some(ErrorInfo::from(&DispatchError::ServerRejected(action.name())))
        } else {
            None
        };
        let log_lines = session.game.messages.since(log_seq);
        debug!(
            "{} settled: {} message(s), {} log line(s), {} turn(s)",
            action.name(),
            collected.len(),
            log_lines.len(),
            turns_elapsed
        );
        Ok(ActionResult {
            class,
            messages: collected,
            log_lines,
            snapshot: session.snapshot(),
            turns_elapsed,
            error,
            action,
        })
    }

    /// Wait for the server to finish reacting to the keys just sent.
    async fn settle(
        &self,
        events: &mut mpsc::UnboundedReceiver<InboundEvent>,
        rule: SettleRule,
        limit: Duration,
        collected: &mut Vec<ProtocolMessage>,
    ) -> Result<(), DispatchError> {
        let deadline = Instant::now() + limit;
        let mut tentative = false;
        loop {
            let wait_until = if tentative {
                deadline.min(Instant::now() + self.config.settle_quiet())
            } else {
                deadline
            };
            match timeout_at(wait_until, events.recv()).await {
                // A tentative settle stands once the server goes quiet.
                Err(_) if tentative => break,
                Err(_) => {
                    return Err(DispatchError::Timeout {
                        action: "settle",
                        waited_ms: limit.as_millis() as u64,
                    })
                }
                Ok(None) => return Err(DispatchError::ConnectionLost("event channel closed".to_string())),
                Ok(Some(InboundEvent::Disconnected { reason })) => {
                    return Err(DispatchError::ConnectionLost(reason))
                }
                Ok(Some(InboundEvent::Message { message, settle })) => {
                    let step = classify(rule, &message, settle);
                    collected.push(message);
                    match step {
                        Step::Continue => {}
                        Step::Tentative => tentative = true,
                        Step::Done => break,
                    }
                }
            }
        }

        let grace_end = Instant::now() + self.config.settle_grace();
        while let Ok(Some(event)) = timeout_at(grace_end, events.recv()).await {
            match event {
                InboundEvent::Message { message, .. } => collected.push(message),
                InboundEvent::Disconnected { reason } => {
                    warn!("Connection lost while collecting trailing messages: {}", reason);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Discard events that arrived between actions; they are already applied.
    fn drain_pending(&self, events: &mut mpsc::UnboundedReceiver<InboundEvent>) -> Result<(), DispatchError> {
        let mut leftover = 0usize;
        while let Ok(event) = events.try_recv() {
            if let InboundEvent::Disconnected { reason } = event {
                return Err(DispatchError::ConnectionLost(reason));
            }
            leftover += 1;
        }
        if leftover > 0 {
            debug!("Discarded {} event(s) received between actions", leftover);
        }
        if !self.link.is_alive() {
            return Err(DispatchError::ConnectionLost("link is down".to_string()));
        }
        Ok(())
    }

    async fn auto_resync(&self, events: &mut mpsc::UnboundedReceiver<InboundEvent>) -> Result<(), DispatchError> {
        warn!("Repeated settle timeouts; sending escapes and a redraw request");
        self.send(Outbound::Keys(Action::Resync.key_plan().keys))?;
        let until = Instant::now() + self.config.settle_timeout();
        let mut received = 0usize;
        while let Ok(Some(event)) = timeout_at(until, events.recv()).await {
            match event {
                InboundEvent::Message { settle: Settle::Settled, .. } => {
                    received += 1;
                    break;
                }
                InboundEvent::Message { .. } => received += 1,
                InboundEvent::Disconnected { reason } => return Err(DispatchError::ConnectionLost(reason)),
            }
        }
        info!("Resync drained {} message(s)", received);
        self.consecutive_timeouts.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Send `play`, answer each character-creation screen with the next
    /// configured choice and wait for the first command prompt after the map.
    pub async fn start_game(&self, request: &NewGame) -> Result<GameStart, DispatchError> {
        let mut events = self.events.lock().await;
        self.drain_pending(&mut events)?;
        info!("Starting game {}", request.game_id);
        self.send(Outbound::Message(ClientMessage::Play {
            game_id: request.game_id.clone(),
        }))?;

        let limit = self.config.long_settle_timeout() * START_TIMEOUT_FACTOR;
        let deadline = Instant::now() + limit;
        let mut choices = request.choice_keys().into_iter();
        let mut saw_newgame = false;
        let mut answered_screen = false;
        let mut saw_map = false;
        loop {
            let message = match timeout_at(deadline, events.recv()).await {
                Err(_) => {
                    return Err(DispatchError::Timeout {
                        action: "start_game",
                        waited_ms: limit.as_millis() as u64,
                    })
                }
                Ok(None) => return Err(DispatchError::ConnectionLost("event channel closed".to_string())),
                Ok(Some(InboundEvent::Disconnected { reason })) => return Err(DispatchError::ConnectionLost(reason)),
                Ok(Some(InboundEvent::Message { message, .. })) => message,
            };
            match &message {
                ProtocolMessage::PopupOpen(popup) | ProtocolMessage::PopupUpdate(popup)
                    if popup.kind.as_deref() == Some(NEWGAME_CHOICE) =>
                {
                    saw_newgame = true;
                    if matches!(message, ProtocolMessage::PopupOpen(_)) {
                        answered_screen = false;
                    }
                    if !answered_screen {
                        answered_screen = true;
                        match choices.next() {
                            Some(key) => {
                                debug!("Answering character choice with '{}'", key);
                                self.send(Outbound::Keys(vec![KeyInput::ch(key)]))?;
                            }
                            None => warn!("Server asked for more character choices than configured"),
                        }
                    }
                }
                ProtocolMessage::MapUpdate(_) => saw_map = true,
                ProtocolMessage::InputModeChange { code } if saw_map && InputMode::from_code(*code) == InputMode::Ready => {
                    break
                }
                ProtocolMessage::SessionClosed(reason) => {
                    return Err(DispatchError::SessionEnded(reason.label().to_string()))
                }
                _ => {}
            }
        }

        self.consecutive_timeouts.store(0, Ordering::Relaxed);
        let session = self.session.read().await;
        if !saw_newgame {
            info!("Server resumed an existing save");
        }
        Ok(GameStart {
            resumed: !saw_newgame,
            snapshot: session.snapshot(),
        })
    }

    fn send(&self, outbound: Outbound) -> Result<(), DispatchError> {
        self.outbound
            .send(outbound)
            .map_err(|_| DispatchError::ConnectionLost("writer task stopped".to_string()))
    }
}

/// Meta actions answer one specific piece of UI. Without it their keys would
/// reach the game as ordinary commands.
fn check_ui_target(action: &Action, ui: &UiState) -> Result<(), DispatchError> {
    let invalid = |reason: String| Err(DispatchError::InvalidAction(reason));
    let prompt_pending = ui.pending_prompt().is_some() || ui.mode == InputMode::TextPrompt;
    match action {
        Action::SelectMenuItem { key } => match ui.active_menu() {
            None => invalid("no menu is open".to_string()),
            Some(menu) if menu.items.iter().any(|item| item.hotkey.is_some()) && !menu.has_hotkey(*key) => {
                invalid(format!("the open menu has no item '{}'", key))
            }
            Some(_) => Ok(()),
        },
        Action::Confirm | Action::Deny => {
            let popup_asks = ui.active_popup().is_some_and(|popup| !popup.prompt.is_empty());
            if prompt_pending || popup_asks {
                Ok(())
            } else {
                invalid("no question is waiting for an answer".to_string())
            }
        }
        Action::Respond { .. } if !prompt_pending => invalid("no prompt is waiting for text".to_string()),
        Action::ChooseStat { .. } => {
            if ui.pending_prompt().map(|p| p.kind) == Some(PromptKind::StatIncrease) {
                Ok(())
            } else {
                invalid("no stat increase prompt is pending".to_string())
            }
        }
        _ => Ok(()),
    }
}

fn classify(rule: SettleRule, message: &ProtocolMessage, settle: Settle) -> Step {
    let closes = matches!(message, ProtocolMessage::SessionClosed(_));
    match rule {
        SettleRule::Immediate if settle == Settle::Settled => Step::Done,
        SettleRule::Immediate => Step::Continue,
        SettleRule::Sequence => {
            let ready = matches!(
                message,
                ProtocolMessage::InputModeChange { code } if InputMode::from_code(*code) == InputMode::Ready
            );
            if closes || ready {
                Step::Done
            } else if settle == Settle::Settled {
                Step::Tentative
            } else {
                Step::Continue
            }
        }
        SettleRule::SessionEnd if closes || matches!(message, ProtocolMessage::Lobby { .. }) => Step::Done,
        SettleRule::SessionEnd => Step::Continue,
    }
}
