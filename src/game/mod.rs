//! # Game Session Module
//!
//! Everything the client knows about the running game, rebuilt from server
//! messages.
//!
//! - [`state`] - player stats, inventory, message log and level map
//! - [`ui`] - input mode and the single modal element (menu, popup, prompt)
//! - [`session`] - the reconciliation point that applies each message once
//! - [`view`] - plain-text renderings used by the query capabilities

pub mod session;
pub mod state;
pub mod ui;
pub mod view;

pub use session::{InboundEvent, SessionFeed, SessionState, Settle, SharedSession, StateSnapshot};
pub use state::{GameState, Item, PlayerStats};
pub use ui::{ActiveUi, BlockReason, InputMode, PromptKind, UiState};
