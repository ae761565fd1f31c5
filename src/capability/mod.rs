//! # Capability Surface
//!
//! Named operations for an external orchestration loop. Every call returns a
//! [`CapabilityResponse`] (`{ok, state_snapshot, messages, error?}`); nothing
//! here panics or returns a bare error, so the caller can hand responses
//! straight to a model or a log.
//!
//! Free operations read the cached session and send nothing. Everything else
//! becomes an [`Action`] and goes through the [`Dispatcher`].

pub mod catalogue;

pub use catalogue::{CapabilitySpec, Cost, ParamKind, ParamSpec, CATALOGUE};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::dispatch::{
    Action, ActionResult, Direction, DispatchError, Dispatcher, ErrorCode, ErrorInfo, Slot, Stat,
};
use crate::game::{view, StateSnapshot};

const DEFAULT_MAP_RADIUS: i64 = 7;
const MAX_MAP_RADIUS: i64 = 20;
const DEFAULT_MESSAGE_COUNT: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityResponse {
    pub ok: bool,
    pub state_snapshot: StateSnapshot,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

pub struct Capabilities {
    dispatcher: Arc<Dispatcher>,
}

impl Capabilities {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn catalogue() -> &'static [CapabilitySpec] {
        CATALOGUE
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Run one named capability. `params` is a JSON object (or null).
    pub async fn invoke(&self, name: &str, params: &Value) -> CapabilityResponse {
        let Some(spec) = catalogue::find(name) else {
            return self
                .failure(DispatchError::InvalidAction(format!("unknown capability '{}'", name)))
                .await;
        };
        debug!("Invoking {} with {}", name, params);
        if spec.cost == Cost::Free {
            return match self.query(name, params).await {
                Ok(messages) => self.success(messages).await,
                Err(e) => self.failure(e).await,
            };
        }
        let action = match parse_action(name, params) {
            Ok(action) => action,
            Err(reason) => return self.failure(DispatchError::InvalidAction(reason)).await,
        };
        match self.perform(action).await {
            Ok(result) => from_result(result),
            Err(e) => self.failure(e).await,
        }
    }

    async fn perform(&self, action: Action) -> Result<ActionResult, DispatchError> {
        let stairs = match &action {
            Action::GoUpstairs => Some("<"),
            Action::GoDownstairs => Some(">"),
            _ => None,
        };
        let first = self.dispatcher.dispatch(action).await?;
        let rejected = first.error.as_ref().map(|e| e.code) == Some(ErrorCode::ServerRejected);
        match stairs {
            Some(destination) if rejected => {
                info!("Not on stairs; travelling to the nearest '{}'", destination);
                let mut travelled = self
                    .dispatcher
                    .dispatch_continuation(Action::Travel {
                        destination: destination.to_string(),
                    })
                    .await?;
                let mut log_lines = first.log_lines;
                log_lines.append(&mut travelled.log_lines);
                travelled.log_lines = log_lines;
                Ok(travelled)
            }
            _ => Ok(first),
        }
    }

    async fn query(&self, name: &str, params: &Value) -> Result<Vec<String>, DispatchError> {
        if name == "narrate" {
            let thought: String = param(params, "thought").map_err(DispatchError::InvalidAction)?;
            if thought.trim().is_empty() {
                return Err(DispatchError::InvalidAction("narrate needs a thought".to_string()));
            }
            self.dispatcher.record_narration(&thought).await;
            return Ok(vec!["Narration recorded.".to_string()]);
        }

        let session = self.dispatcher.session().read().await;
        let game = &session.game;
        let lines = match name {
            "get_state" => vec![view::state_text(&session)],
            "get_stats" => vec![view::stats_line(game)],
            "get_map" => {
                let radius = opt_param::<i64>(params, "radius")
                    .map_err(DispatchError::InvalidAction)?
                    .unwrap_or(DEFAULT_MAP_RADIUS)
                    .clamp(1, MAX_MAP_RADIUS);
                vec![view::render_map(game, radius as i32)]
            }
            "get_inventory" => or_else(view::inventory_lines(game), "Inventory is empty."),
            "get_nearby_enemies" => or_else(view::enemy_lines(game), "No enemies in sight."),
            "get_messages" => {
                let n = opt_param::<i64>(params, "n")
                    .map_err(DispatchError::InvalidAction)?
                    .unwrap_or(DEFAULT_MESSAGE_COUNT)
                    .max(0);
                or_else(game.messages.recent(n as usize), "No messages yet.")
            }
            "get_landmarks" => view::landmark_lines(game),
            "read_ui" => view::read_ui(&session.ui),
            "examine" => {
                let slot: Slot = param(params, "slot").map_err(DispatchError::InvalidAction)?;
                match game.item_in_slot(slot.letter()) {
                    Some(item) => vec![format!("{} - {} (qty: {})", item.slot, item.name, item.quantity)],
                    None => vec![format!("No item in slot '{}'.", slot)],
                }
            }
            other => {
                return Err(DispatchError::InvalidAction(format!(
                    "'{}' is not a query",
                    other
                )))
            }
        };
        Ok(lines)
    }

    async fn snapshot(&self) -> StateSnapshot {
        self.dispatcher.session().read().await.snapshot()
    }

    async fn success(&self, messages: Vec<String>) -> CapabilityResponse {
        CapabilityResponse {
            ok: true,
            state_snapshot: self.snapshot().await,
            messages,
            error: None,
        }
    }

    async fn failure(&self, error: DispatchError) -> CapabilityResponse {
        CapabilityResponse {
            ok: false,
            state_snapshot: self.snapshot().await,
            messages: Vec::new(),
            error: Some(ErrorInfo::from(&error)),
        }
    }
}

fn from_result(result: ActionResult) -> CapabilityResponse {
    CapabilityResponse {
        ok: result.error.is_none(),
        state_snapshot: result.snapshot,
        messages: result.log_lines,
        error: result.error,
    }
}

fn or_else(lines: Vec<String>, empty: &str) -> Vec<String> {
    if lines.is_empty() {
        vec![empty.to_string()]
    } else {
        lines
    }
}

fn param<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, String> {
    opt_param(params, key)?.ok_or_else(|| format!("missing parameter '{}'", key))
}

fn opt_param<T: DeserializeOwned>(params: &Value, key: &str) -> Result<Option<T>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| format!("bad parameter '{}': {}", key, e)),
    }
}

/// Single-character key parameter.
fn key_param(params: &Value, key: &str) -> Result<char, String> {
    let text: String = param(params, key)?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("parameter '{}' must be a single key", key)),
    }
}

/// Map a non-free capability name and its parameters to an action.
pub fn parse_action(name: &str, params: &Value) -> Result<Action, String> {
    let slot = || param::<Slot>(params, "slot");
    let direction = || param::<Direction>(params, "direction");
    let action = match name {
        "move" => Action::Move { direction: direction()? },
        "attack" => Action::Attack { direction: direction()? },
        "auto_explore" => Action::AutoExplore,
        "auto_fight" => Action::AutoFight,
        "rest" => Action::Rest,
        "wait_turn" => Action::Wait,
        "go_upstairs" => Action::GoUpstairs,
        "go_downstairs" => Action::GoDownstairs,
        "travel" => Action::Travel {
            destination: param(params, "destination")?,
        },
        "pickup" => Action::Pickup,
        "wield" => Action::Wield { slot: slot()? },
        "wear" => Action::Wear { slot: slot()? },
        "quaff" => Action::Quaff { slot: slot()? },
        "read_scroll" => Action::Read { slot: slot()? },
        "drop" => Action::Drop { slot: slot()? },
        "zap_wand" => Action::Zap {
            slot: slot()?,
            direction: opt_param(params, "direction")?,
        },
        "evoke" => Action::Evoke { slot: slot()? },
        "throw_item" => Action::Throw {
            slot: slot()?,
            direction: direction()?,
        },
        "put_on_jewelry" => Action::PutOn { slot: slot()? },
        "remove_jewelry" => Action::Remove {
            slot: opt_param(params, "slot")?,
        },
        "take_off_armour" => Action::TakeOff { slot: slot()? },
        "use_ability" => Action::Ability {
            key: key_param(params, "key")?,
        },
        "cast_spell" => Action::Cast {
            key: key_param(params, "key")?,
            direction: opt_param(params, "direction")?,
        },
        "pray" => Action::Pray,
        "send_keys" => Action::SendKeys {
            keys: param(params, "keys")?,
        },
        "quit" => Action::Quit,
        "save_and_exit" => Action::SaveAndExit,
        "select_menu_item" => Action::SelectMenuItem {
            key: key_param(params, "key")?,
        },
        "dismiss" => Action::Dismiss,
        "acknowledge" => Action::Acknowledge,
        "confirm" => Action::Confirm,
        "deny" => Action::Deny,
        "respond" => Action::Respond {
            text: param(params, "text")?,
        },
        "choose_stat" => Action::ChooseStat {
            stat: param::<Stat>(params, "stat")?,
        },
        "escape" => Action::Escape,
        "resync" => Action::Resync,
        other => return Err(format!("'{}' is not an action", other)),
    };
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::game::{SessionFeed, SessionState};
    use crate::webtiles::protocol::{decode, KeyInput, ProtocolMessage};
    use crate::webtiles::{LinkStatus, Outbound};
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn every_non_free_capability_parses() {
        let params = json!({"direction":"n","slot":"a","key":"a","destination":">","keys":"o",
            "text":"yes","stat":"S"});
        for spec in CATALOGUE.iter().filter(|c| c.cost != Cost::Free) {
            let action = parse_action(spec.name, &params)
                .unwrap_or_else(|e| panic!("{} failed to parse: {}", spec.name, e));
            assert_eq!(action.name(), spec.name);
        }
    }

    #[test]
    fn bad_parameters_are_reported() {
        assert!(parse_action("move", &json!({"direction":"up-left"})).is_err());
        assert!(parse_action("quaff", &json!({})).unwrap_err().contains("missing parameter 'slot'"));
        assert!(parse_action("use_ability", &json!({"key":"ab"})).is_err());
        assert!(parse_action("remove_jewelry", &Value::Null).is_ok());
    }

    async fn surface() -> (Capabilities, SessionFeed) {
        let session = SessionState::shared(50);
        let (feed, events) = SessionFeed::new(session.clone());
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(session, events, out_tx, LinkStatus::new(), DispatchConfig::default());
        (Capabilities::new(Arc::new(dispatcher)), feed)
    }

    #[tokio::test]
    async fn free_queries_read_cached_state() {
        let (caps, feed) = surface().await;
        feed.push(ProtocolMessage::GameStarted).await;
        feed.push(
            decode(json!({"msg":"player","inv":{"0":{"name":"a +0 club","quantity":1}},"weapon_index":0}))
                .unwrap(),
        )
        .await;
        let inv = caps.invoke("get_inventory", &Value::Null).await;
        assert!(inv.ok);
        assert_eq!(inv.messages, vec!["a) a +0 club (wielded)"]);

        let examined = caps.invoke("examine", &json!({"slot":"a"})).await;
        assert_eq!(examined.messages, vec!["a - a +0 club (qty: 1)"]);

        let enemies = caps.invoke("get_nearby_enemies", &json!({})).await;
        assert_eq!(enemies.messages, vec!["No enemies in sight."]);
    }

    #[tokio::test]
    async fn unknown_names_and_missing_params_fail_softly() {
        let (caps, _feed) = surface().await;
        let unknown = caps.invoke("teleport", &json!({})).await;
        assert!(!unknown.ok);
        assert_eq!(unknown.error.map(|e| e.code), Some(ErrorCode::InvalidAction));
        let narrate = caps.invoke("narrate", &json!({})).await;
        assert!(!narrate.ok);
        let ok = caps.invoke("narrate", &json!({"thought":"time to descend"})).await;
        assert!(ok.ok);
    }

    #[tokio::test]
    async fn stairs_fallback_counts_as_one_narrated_action() {
        let session = SessionState::shared(50);
        let (feed, events) = SessionFeed::new(session.clone());
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let config = DispatchConfig {
            settle_timeout_ms: 300,
            long_settle_timeout_ms: 500,
            settle_grace_ms: 10,
            settle_quiet_ms: 40,
            narrate_interval: 1,
            message_log_capacity: 50,
        };
        let dispatcher = Arc::new(Dispatcher::new(session, events, out_tx, LinkStatus::new(), config));
        let caps = Capabilities::new(dispatcher.clone());

        // Not standing on stairs: '>' changes nothing, travel spends turns.
        let server = feed.clone();
        tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                let Outbound::Keys(keys) = out else { continue };
                if keys.first() == Some(&KeyInput::ch('G')) {
                    server.push(decode(json!({"msg":"player","turn":5})).unwrap()).await;
                }
                server.push(ProtocolMessage::InputModeChange { code: 1 }).await;
            }
        });
        feed.push(ProtocolMessage::GameStarted).await;
        feed.push(ProtocolMessage::InputModeChange { code: 1 }).await;

        let resp = caps.invoke("go_downstairs", &json!({})).await;
        assert!(resp.ok, "fallback failed: {:?}", resp.error);
        assert_eq!(resp.state_snapshot.turn, 5);
        assert_eq!(dispatcher.actions_since_narration(), 1);
    }

    #[tokio::test]
    async fn actions_outside_a_game_are_invalid() {
        let (caps, _feed) = surface().await;
        let resp = caps.invoke("move", &json!({"direction":"n"})).await;
        assert!(!resp.ok);
        assert_eq!(resp.error.map(|e| e.code), Some(ErrorCode::InvalidAction));
        assert!(!resp.state_snapshot.in_game);
    }
}
