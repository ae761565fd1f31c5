//! Input mode and modal UI tracking.
//!
//! The server reports what kind of input it is waiting for with a numeric
//! mode code. [`InputMode::from_code`] is the single place those codes are
//! interpreted. Menus, popups and pending prompts are modal: [`UiState`] holds
//! at most one of them in [`UiState::active`], so the "only one element open"
//! rule cannot be broken by construction.
use serde::Serialize;
use std::fmt;

use crate::webtiles::protocol::{MenuChange, MenuData, MenuItem, PopupData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "code", rename_all = "snake_case")]
pub enum InputMode {
    /// The game is busy (running, resting, traveling) and not reading commands.
    Traveling,
    /// Waiting for a normal command.
    Ready,
    /// A `--more--` page must be acknowledged.
    Paginated,
    /// A line or yes/no prompt needs an answer.
    TextPrompt,
    /// A code with no mapping (targeting, macro editing, future modes).
    Unmapped(i64),
}

impl InputMode {
    /// | code | server meaning       | mode       |
    /// |------|----------------------|------------|
    /// | 0    | normal / busy        | Traveling  |
    /// | 1    | command              | Ready      |
    /// | 5    | more                 | Paginated  |
    /// | 7    | line prompt          | TextPrompt |
    /// | 8    | yes/no prompt        | TextPrompt |
    /// | else | targeting, macro, .. | Unmapped   |
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => InputMode::Traveling,
            1 => InputMode::Ready,
            5 => InputMode::Paginated,
            7 | 8 => InputMode::TextPrompt,
            other => InputMode::Unmapped(other),
        }
    }

    /// Codes 2..=4 are the server's targeting modes (target, direction, path).
    pub fn is_targeting(&self) -> bool {
        matches!(self, InputMode::Unmapped(2..=4))
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Traveling => write!(f, "traveling"),
            InputMode::Ready => write!(f, "ready"),
            InputMode::Paginated => write!(f, "paginated"),
            InputMode::TextPrompt => write!(f, "text prompt"),
            InputMode::Unmapped(code) => write!(f, "unmapped mode {}", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Level-up attribute choice, answered with `S`, `I` or `D`.
    StatIncrease,
    YesNo,
    FreeText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub kind: PromptKind,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Menu {
    pub tag: String,
    pub title: String,
    pub more: String,
    pub items: Vec<MenuItem>,
}

impl From<MenuData> for Menu {
    fn from(data: MenuData) -> Self {
        Self {
            tag: data.tag,
            title: data.title,
            more: data.more,
            items: data.items,
        }
    }
}

impl Menu {
    fn apply(&mut self, change: MenuChange) {
        match change {
            MenuChange::Fields { title, more, items } => {
                if let Some(title) = title {
                    self.title = title;
                }
                if let Some(more) = more {
                    self.more = more;
                }
                if let Some(items) = items {
                    self.items = items;
                }
            }
            MenuChange::Items { chunk_start, items } => {
                // Chunks may arrive ahead of earlier ones; blank slots hold their place.
                let end = chunk_start + items.len();
                if self.items.len() < end {
                    self.items.resize_with(end, MenuItem::default);
                }
                self.items.splice(chunk_start..end, items);
            }
        }
    }

    pub fn has_hotkey(&self, key: char) -> bool {
        self.items.iter().any(|item| item.hotkey == Some(key))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Popup {
    pub kind: String,
    pub title: String,
    pub body: String,
    pub prompt: String,
    pub details: Vec<String>,
}

impl Popup {
    fn merge(&mut self, data: PopupData) {
        if let Some(kind) = data.kind {
            self.kind = kind;
        }
        if let Some(title) = data.title {
            self.title = title;
        }
        if let Some(body) = data.body {
            self.body = body;
        }
        if let Some(prompt) = data.prompt {
            self.prompt = prompt;
        }
        if !data.details.is_empty() {
            self.details = data.details;
        }
    }
}

/// The single modal element the server currently shows, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActiveUi {
    Menu(Menu),
    Popup(Popup),
    Prompt(Prompt),
}

/// Why an action may not run right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "blocker", rename_all = "snake_case")]
pub enum BlockReason {
    Menu { title: String },
    Popup { kind: String },
    Prompt { kind: PromptKind },
    Paginated,
    Traveling,
    UnmappedMode { code: i64 },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Menu { title } if title.is_empty() => write!(f, "a menu is open"),
            BlockReason::Menu { title } => write!(f, "menu '{}' is open", title),
            BlockReason::Popup { kind } => write!(f, "popup '{}' is open", kind),
            BlockReason::Prompt { kind: PromptKind::StatIncrease } => {
                write!(f, "stat increase prompt is waiting for S, I or D")
            }
            BlockReason::Prompt { .. } => write!(f, "a prompt is waiting for an answer"),
            BlockReason::Paginated => write!(f, "a --more-- page must be acknowledged"),
            BlockReason::Traveling => write!(f, "the game is busy and not accepting commands"),
            BlockReason::UnmappedMode { code } => write!(f, "server is in unmapped input mode {}", code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiState {
    pub mode: InputMode,
    pub active: Option<ActiveUi>,
}

impl Default for UiState {
    /// Until the server first asks for input the game counts as busy.
    fn default() -> Self {
        Self {
            mode: InputMode::Traveling,
            active: None,
        }
    }
}

impl UiState {
    pub fn active_menu(&self) -> Option<&Menu> {
        match &self.active {
            Some(ActiveUi::Menu(menu)) => Some(menu),
            _ => None,
        }
    }

    pub fn active_popup(&self) -> Option<&Popup> {
        match &self.active {
            Some(ActiveUi::Popup(popup)) => Some(popup),
            _ => None,
        }
    }

    pub fn pending_prompt(&self) -> Option<&Prompt> {
        match &self.active {
            Some(ActiveUi::Prompt(prompt)) => Some(prompt),
            _ => None,
        }
    }

    /// What, if anything, stops a turn-consuming action.
    pub fn blocker(&self) -> Option<BlockReason> {
        match &self.active {
            Some(ActiveUi::Menu(menu)) => {
                return Some(BlockReason::Menu {
                    title: menu.title.clone(),
                })
            }
            Some(ActiveUi::Popup(popup)) => {
                return Some(BlockReason::Popup {
                    kind: popup.kind.clone(),
                })
            }
            Some(ActiveUi::Prompt(prompt)) => return Some(BlockReason::Prompt { kind: prompt.kind }),
            None => {}
        }
        match self.mode {
            InputMode::Ready => None,
            InputMode::Traveling => Some(BlockReason::Traveling),
            InputMode::Paginated => Some(BlockReason::Paginated),
            // A text prompt without a recorded prompt still needs an answer.
            InputMode::TextPrompt => Some(BlockReason::Prompt {
                kind: PromptKind::FreeText,
            }),
            InputMode::Unmapped(code) => Some(BlockReason::UnmappedMode { code }),
        }
    }

    pub(crate) fn set_mode(&mut self, mode: InputMode) {
        if self.mode == InputMode::TextPrompt && mode != InputMode::TextPrompt {
            if let Some(ActiveUi::Prompt(_)) = self.active {
                self.active = None;
            }
        }
        self.mode = mode;
    }

    pub(crate) fn open(&mut self, ui: ActiveUi) {
        self.active = Some(ui);
    }

    pub(crate) fn update_menu(&mut self, change: MenuChange) -> bool {
        match &mut self.active {
            Some(ActiveUi::Menu(menu)) => {
                menu.apply(change);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn update_popup(&mut self, data: PopupData) -> bool {
        match &mut self.active {
            Some(ActiveUi::Popup(popup)) => {
                popup.merge(data);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn close_menu(&mut self) {
        if matches!(self.active, Some(ActiveUi::Menu(_))) {
            self.active = None;
        }
    }

    pub(crate) fn close_popup(&mut self) {
        if matches!(self.active, Some(ActiveUi::Popup(_))) {
            self.active = None;
        }
    }

    pub(crate) fn popup_from(data: PopupData) -> ActiveUi {
        let mut popup = Popup::default();
        popup.merge(data);
        ActiveUi::Popup(popup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table_is_exhaustive_and_conservative() {
        assert_eq!(InputMode::from_code(0), InputMode::Traveling);
        assert_eq!(InputMode::from_code(1), InputMode::Ready);
        assert_eq!(InputMode::from_code(5), InputMode::Paginated);
        assert_eq!(InputMode::from_code(7), InputMode::TextPrompt);
        assert_eq!(InputMode::from_code(8), InputMode::TextPrompt);
        for code in [2, 3, 4, 6, 9, 42, -1] {
            assert_eq!(InputMode::from_code(code), InputMode::Unmapped(code));
        }
        assert!(InputMode::from_code(4).is_targeting());
        assert!(!InputMode::from_code(6).is_targeting());
    }

    #[test]
    fn opening_a_popup_replaces_the_menu() {
        let mut ui = UiState {
            mode: InputMode::Ready,
            active: None,
        };
        ui.open(ActiveUi::Menu(Menu {
            title: "Inventory".into(),
            ..Default::default()
        }));
        assert!(ui.active_menu().is_some());
        ui.open(UiState::popup_from(PopupData {
            kind: Some("describe-item".into()),
            ..Default::default()
        }));
        assert!(ui.active_menu().is_none());
        assert_eq!(ui.active_popup().map(|p| p.kind.as_str()), Some("describe-item"));
        // closing a menu that is not active leaves the popup alone
        ui.close_menu();
        assert!(ui.active_popup().is_some());
        ui.close_popup();
        assert!(ui.active.is_none());
    }

    #[test]
    fn blocker_prefers_modal_element_over_mode() {
        let mut ui = UiState::default();
        assert_eq!(ui.blocker(), Some(BlockReason::Traveling));
        ui.set_mode(InputMode::Ready);
        assert_eq!(ui.blocker(), None);
        ui.set_mode(InputMode::Paginated);
        assert_eq!(ui.blocker(), Some(BlockReason::Paginated));
        ui.set_mode(InputMode::TextPrompt);
        ui.open(ActiveUi::Prompt(Prompt {
            kind: PromptKind::StatIncrease,
            text: String::new(),
        }));
        assert_eq!(
            ui.blocker(),
            Some(BlockReason::Prompt {
                kind: PromptKind::StatIncrease
            })
        );
        ui.set_mode(InputMode::Ready);
        assert!(ui.pending_prompt().is_none());
        assert_eq!(ui.blocker(), None);
    }

    #[test]
    fn menu_chunks_replace_then_extend() {
        let mut menu = Menu::default();
        let item = |t: &str| MenuItem {
            text: t.into(),
            level: 2,
            hotkey: t.chars().next(),
        };
        menu.apply(MenuChange::Fields {
            title: Some("Pick up".into()),
            more: None,
            items: Some(vec![item("a"), item("b")]),
        });
        menu.apply(MenuChange::Items {
            chunk_start: 1,
            items: vec![item("x"), item("y")],
        });
        let texts: Vec<_> = menu.items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "x", "y"]);
        assert!(menu.has_hotkey('y'));
    }

    #[test]
    fn menu_chunk_past_the_end_keeps_its_indices() {
        let mut menu = Menu::default();
        let item = |t: &str| MenuItem {
            text: t.into(),
            level: 2,
            hotkey: t.chars().next(),
        };
        menu.apply(MenuChange::Items {
            chunk_start: 3,
            items: vec![item("d"), item("e")],
        });
        assert_eq!(menu.items.len(), 5);
        assert_eq!(menu.items[3].text, "d");
        assert_eq!(menu.items[4].text, "e");
        assert!(menu.items[..3].iter().all(|i| i.text.is_empty() && i.hotkey.is_none()));

        menu.apply(MenuChange::Items {
            chunk_start: 0,
            items: vec![item("a"), item("b"), item("c")],
        });
        let texts: Vec<_> = menu.items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d", "e"]);
    }
}
