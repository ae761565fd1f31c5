//! Actions and their keystroke translations.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::webtiles::protocol::KeyInput;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Direction {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

impl Direction {
    /// Numpad digit the server maps to this step.
    pub fn numpad(self) -> char {
        match self {
            Direction::North => '8',
            Direction::Northeast => '9',
            Direction::East => '6',
            Direction::Southeast => '3',
            Direction::South => '2',
            Direction::Southwest => '1',
            Direction::West => '4',
            Direction::Northwest => '7',
        }
    }

    pub fn short(self) -> &'static str {
        match self {
            Direction::North => "n",
            Direction::Northeast => "ne",
            Direction::East => "e",
            Direction::Southeast => "se",
            Direction::South => "s",
            Direction::Southwest => "sw",
            Direction::West => "w",
            Direction::Northwest => "nw",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect();
        let dir = match normalized.as_str() {
            "n" | "north" | "up" => Direction::North,
            "ne" | "northeast" => Direction::Northeast,
            "e" | "east" | "right" => Direction::East,
            "se" | "southeast" => Direction::Southeast,
            "s" | "south" | "down" => Direction::South,
            "sw" | "southwest" => Direction::Southwest,
            "w" | "west" | "left" => Direction::West,
            "nw" | "northwest" => Direction::Northwest,
            _ => return Err(format!("invalid direction '{}'; use n/ne/e/se/s/sw/w/nw", s)),
        };
        Ok(dir)
    }
}

impl TryFrom<String> for Direction {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// Inventory letter, `a-z` or `A-Z`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub struct Slot(char);

impl Slot {
    pub fn new(letter: char) -> Result<Self, String> {
        if letter.is_ascii_alphabetic() {
            Ok(Slot(letter))
        } else {
            Err(format!("invalid inventory slot '{}'; use a letter a-z or A-Z", letter))
        }
    }

    pub fn letter(self) -> char {
        self.0
    }
}

impl TryFrom<String> for Slot {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Slot::new(c),
            _ => Err(format!("invalid inventory slot '{}'; expected one letter", s)),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attribute offered on level-up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Stat {
    Strength,
    Intelligence,
    Dexterity,
}

impl Stat {
    /// The server wants the uppercase initial.
    pub fn key(self) -> char {
        match self {
            Stat::Strength => 'S',
            Stat::Intelligence => 'I',
            Stat::Dexterity => 'D',
        }
    }
}

impl TryFrom<String> for Stat {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "str" | "strength" => Ok(Stat::Strength),
            "i" | "int" | "intelligence" => Ok(Stat::Intelligence),
            "d" | "dex" | "dexterity" => Ok(Stat::Dexterity),
            _ => Err(format!("invalid stat '{}'; use S, I or D", s)),
        }
    }
}

/// How much an action costs in game terms.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// Consumes game time; gated by UI state and the narration policy.
    Turn,
    /// Answers or dismisses UI; allowed while UI is open, never counted.
    Meta,
    /// Ends the game session (quit, save).
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Move { direction: Direction },
    Attack { direction: Direction },
    AutoExplore,
    AutoFight,
    Rest,
    Wait,
    GoUpstairs,
    GoDownstairs,
    /// Interlevel travel: `G`, the destination text, Enter.
    Travel { destination: String },
    Pickup,
    Wield { slot: Slot },
    Wear { slot: Slot },
    Quaff { slot: Slot },
    Read { slot: Slot },
    Drop { slot: Slot },
    Zap { slot: Slot, direction: Option<Direction> },
    Evoke { slot: Slot },
    Throw { slot: Slot, direction: Direction },
    PutOn { slot: Slot },
    Remove { slot: Option<Slot> },
    TakeOff { slot: Slot },
    Ability { key: char },
    Cast { key: char, direction: Option<Direction> },
    Pray,
    SendKeys { keys: String },
    Quit,
    SaveAndExit,
    SelectMenuItem { key: char },
    Dismiss,
    Acknowledge,
    Confirm,
    Deny,
    Respond { text: String },
    ChooseStat { stat: Stat },
    Escape,
    Resync,
}

/// Keys to send, plus a second stage used only if the server enters a
/// targeting mode after the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPlan {
    pub keys: Vec<KeyInput>,
    pub targeting_followup: Option<Vec<KeyInput>>,
}

/// Which settling messages end the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleRule {
    /// The first settling message ends the wait.
    Immediate,
    /// Intermediate menus and prompts are expected; only `Ready` or a session
    /// close settles at once, anything else once the server goes quiet.
    Sequence,
    /// Only a session close or a return to the lobby settles.
    SessionEnd,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Attack { .. } => "attack",
            Action::AutoExplore => "auto_explore",
            Action::AutoFight => "auto_fight",
            Action::Rest => "rest",
            Action::Wait => "wait_turn",
            Action::GoUpstairs => "go_upstairs",
            Action::GoDownstairs => "go_downstairs",
            Action::Travel { .. } => "travel",
            Action::Pickup => "pickup",
            Action::Wield { .. } => "wield",
            Action::Wear { .. } => "wear",
            Action::Quaff { .. } => "quaff",
            Action::Read { .. } => "read_scroll",
            Action::Drop { .. } => "drop",
            Action::Zap { .. } => "zap_wand",
            Action::Evoke { .. } => "evoke",
            Action::Throw { .. } => "throw_item",
            Action::PutOn { .. } => "put_on_jewelry",
            Action::Remove { .. } => "remove_jewelry",
            Action::TakeOff { .. } => "take_off_armour",
            Action::Ability { .. } => "use_ability",
            Action::Cast { .. } => "cast_spell",
            Action::Pray => "pray",
            Action::SendKeys { .. } => "send_keys",
            Action::Quit => "quit",
            Action::SaveAndExit => "save_and_exit",
            Action::SelectMenuItem { .. } => "select_menu_item",
            Action::Dismiss => "dismiss",
            Action::Acknowledge => "acknowledge",
            Action::Confirm => "confirm",
            Action::Deny => "deny",
            Action::Respond { .. } => "respond",
            Action::ChooseStat { .. } => "choose_stat",
            Action::Escape => "escape",
            Action::Resync => "resync",
        }
    }

    pub fn class(&self) -> ActionClass {
        match self {
            Action::SelectMenuItem { .. }
            | Action::Dismiss
            | Action::Acknowledge
            | Action::Confirm
            | Action::Deny
            | Action::Respond { .. }
            | Action::ChooseStat { .. }
            | Action::Escape
            | Action::Resync => ActionClass::Meta,
            Action::Quit | Action::SaveAndExit => ActionClass::Session,
            _ => ActionClass::Turn,
        }
    }

    /// Whitelisted actions may run while a menu, popup or prompt is open.
    pub fn is_whitelisted(&self) -> bool {
        self.class() == ActionClass::Meta
    }

    /// Travel-style actions get the long settle timeout.
    pub fn is_long_running(&self) -> bool {
        matches!(
            self,
            Action::AutoExplore | Action::Rest | Action::Travel { .. } | Action::Quit | Action::SaveAndExit
        )
    }

    /// Reject parameters the server would choke on before any key is sent.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Action::Travel { destination } if destination.trim().is_empty() => {
                Err("travel needs a destination".to_string())
            }
            Action::SendKeys { keys } if keys.is_empty() => Err("send_keys needs at least one key".to_string()),
            Action::Ability { key } | Action::Cast { key, .. } | Action::SelectMenuItem { key }
                if key.is_control() =>
            {
                Err(format!("invalid key {:?}", key))
            }
            _ => Ok(()),
        }
    }

    pub fn key_plan(&self) -> KeyPlan {
        use KeyInput as K;
        let cmd = |c: char| K::ch(c);
        let with_slot = |c: char, slot: &Slot| vec![cmd(c), cmd(slot.letter())];
        let (keys, targeting_followup) = match self {
            Action::Move { direction } | Action::Attack { direction } => (vec![cmd(direction.numpad())], None),
            Action::AutoExplore => (vec![cmd('o')], None),
            Action::AutoFight => (vec![K::tab()], None),
            Action::Rest => (vec![cmd('5')], None),
            Action::Wait => (vec![cmd('.')], None),
            Action::GoUpstairs => (vec![cmd('<')], None),
            Action::GoDownstairs => (vec![cmd('>')], None),
            Action::Travel { destination } => {
                let mut keys = vec![cmd('G')];
                keys.extend(destination.trim().chars().map(cmd));
                keys.push(K::enter());
                (keys, None)
            }
            Action::Pickup => (vec![cmd(',')], None),
            Action::Wield { slot } => (with_slot('w', slot), None),
            Action::Wear { slot } => (with_slot('W', slot), None),
            Action::Quaff { slot } => (with_slot('q', slot), None),
            Action::Read { slot } => (with_slot('r', slot), None),
            Action::Drop { slot } => (with_slot('d', slot), None),
            Action::Zap { slot, direction } => (with_slot('V', slot), Some(vec![target_key(*direction)])),
            Action::Evoke { slot } => (with_slot('v', slot), None),
            Action::Throw { slot, direction } => (with_slot('F', slot), Some(vec![cmd(direction.numpad())])),
            Action::PutOn { slot } => (with_slot('P', slot), None),
            Action::Remove { slot: Some(slot) } => (with_slot('R', slot), None),
            Action::Remove { slot: None } => (vec![cmd('R')], None),
            Action::TakeOff { slot } => (with_slot('T', slot), None),
            Action::Ability { key } => (vec![cmd('a'), cmd(*key)], None),
            Action::Cast { key, direction } => (vec![cmd('z'), cmd(*key)], Some(vec![target_key(*direction)])),
            Action::Pray => (vec![cmd('p')], None),
            Action::SendKeys { keys } => (keys.chars().map(raw_key).collect(), None),
            Action::Quit => (
                vec![K::ctrl('q'), cmd('q'), cmd('u'), cmd('i'), cmd('t'), K::enter()],
                None,
            ),
            Action::SaveAndExit => (vec![K::ctrl('s')], None),
            Action::SelectMenuItem { key } => (vec![cmd(*key)], None),
            Action::Dismiss | Action::Escape => (vec![K::escape()], None),
            Action::Acknowledge => (vec![cmd(' ')], None),
            Action::Confirm => (vec![cmd('Y')], None),
            Action::Deny => (vec![cmd('N')], None),
            Action::Respond { text } => (vec![K::Text(text.clone()), K::enter()], None),
            Action::ChooseStat { stat } => (vec![cmd(stat.key())], None),
            Action::Resync => (vec![K::escape(), K::escape(), K::escape(), K::ctrl('r')], None),
        };
        KeyPlan { keys, targeting_followup }
    }

    pub fn settle_rule(&self) -> SettleRule {
        match self {
            Action::Quit | Action::SaveAndExit => SettleRule::SessionEnd,
            _ if self.key_plan().keys.len() > 1 => SettleRule::Sequence,
            _ => SettleRule::Immediate,
        }
    }
}

/// A direction, or `.` to accept the auto-selected target.
fn target_key(direction: Option<Direction>) -> KeyInput {
    KeyInput::ch(direction.map(Direction::numpad).unwrap_or('.'))
}

fn raw_key(c: char) -> KeyInput {
    match c {
        '\r' | '\n' => KeyInput::enter(),
        '\t' => KeyInput::tab(),
        '\u{1b}' => KeyInput::escape(),
        other => KeyInput::ch(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(keys: &[KeyInput]) -> Vec<String> {
        keys.iter()
            .map(|k| match k {
                KeyInput::Text(t) => t.clone(),
                KeyInput::Code(c) => format!("#{}", c),
            })
            .collect()
    }

    #[test]
    fn directions_accept_short_and_long_names() {
        assert_eq!("NE".parse::<Direction>(), Ok(Direction::Northeast));
        assert_eq!("north-west".parse::<Direction>(), Ok(Direction::Northwest));
        assert_eq!("south".parse::<Direction>(), Ok(Direction::South));
        assert!("sideways".parse::<Direction>().is_err());
        let d: Direction = serde_json::from_value(serde_json::json!("w")).unwrap();
        assert_eq!(d.numpad(), '4');
    }

    #[test]
    fn quit_is_ctrl_q_then_literal_quit() {
        let plan = Action::Quit.key_plan();
        assert_eq!(texts(&plan.keys), vec!["#17", "q", "u", "i", "t", "\r"]);
        assert_eq!(Action::Quit.settle_rule(), SettleRule::SessionEnd);
        assert_eq!(Action::Quit.class(), ActionClass::Session);
        assert!(!Action::Quit.is_whitelisted());
    }

    #[test]
    fn stat_choice_is_uppercase_initial() {
        let stat = Stat::try_from("dex".to_string()).unwrap();
        let plan = Action::ChooseStat { stat }.key_plan();
        assert_eq!(texts(&plan.keys), vec!["D"]);
        assert!(Action::ChooseStat { stat }.is_whitelisted());
    }

    #[test]
    fn item_actions_use_command_then_slot() {
        let slot = Slot::new('b').unwrap();
        assert_eq!(texts(&Action::Quaff { slot }.key_plan().keys), vec!["q", "b"]);
        assert_eq!(Action::Quaff { slot }.settle_rule(), SettleRule::Sequence);
        assert!(Slot::try_from("ab".to_string()).is_err());
        assert!(Slot::new('3').is_err());
    }

    #[test]
    fn targeted_actions_carry_a_followup() {
        let slot = Slot::new('c').unwrap();
        let zap = Action::Zap { slot, direction: Some(Direction::East) }.key_plan();
        assert_eq!(texts(&zap.keys), vec!["V", "c"]);
        assert_eq!(zap.targeting_followup.map(|k| texts(&k)), Some(vec!["6".to_string()]));
        let cast = Action::Cast { key: 'a', direction: None }.key_plan();
        assert_eq!(cast.targeting_followup.map(|k| texts(&k)), Some(vec![".".to_string()]));
    }

    #[test]
    fn classes_and_rules() {
        let mv = Action::Move { direction: Direction::North };
        assert_eq!(mv.class(), ActionClass::Turn);
        assert_eq!(mv.settle_rule(), SettleRule::Immediate);
        assert_eq!(texts(&mv.key_plan().keys), vec!["8"]);
        assert_eq!(Action::Acknowledge.class(), ActionClass::Meta);
        assert!(Action::AutoExplore.is_long_running());
        assert_eq!(texts(&Action::AutoFight.key_plan().keys), vec!["#9"]);
        assert_eq!(
            texts(&Action::Travel { destination: ">".into() }.key_plan().keys),
            vec!["G", ">", "\r"]
        );
        assert_eq!(texts(&Action::Resync.key_plan().keys), vec!["#27", "#27", "#27", "#18"]);
        assert!(Action::Travel { destination: " ".into() }.validate().is_err());
        assert!(Action::SendKeys { keys: String::new() }.validate().is_err());
    }
}
