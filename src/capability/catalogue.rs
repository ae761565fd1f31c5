//! Fixed list of operations offered to the orchestration loop.
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cost {
    /// Reads cached state; sends nothing.
    Free,
    /// Sends keys to answer or dismiss UI; never counted as a turn.
    Meta,
    /// Spends game time.
    Turn,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Direction,
    Slot,
    Key,
    Stat,
    Text,
    Integer,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapabilitySpec {
    pub name: &'static str,
    pub cost: Cost,
    pub summary: &'static str,
    pub params: &'static [ParamSpec],
}

const fn req(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec { name, kind, required: true }
}

const fn opt(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec { name, kind, required: false }
}

macro_rules! cap {
    ($name:literal, $cost:ident, $summary:literal $(, $param:expr)* $(,)?) => {
        CapabilitySpec {
            name: $name,
            cost: Cost::$cost,
            summary: $summary,
            params: &[$($param),*],
        }
    };
}

use ParamKind::*;

pub static CATALOGUE: &[CapabilitySpec] = &[
    // Free queries
    cap!("get_state", Free, "Full overview: stats, recent messages, inventory, enemies and open UI"),
    cap!("get_stats", Free, "One-line character summary"),
    cap!("get_map", Free, "ASCII map around the player (@)", opt("radius", Integer)),
    cap!("get_inventory", Free, "Inventory with slot letters"),
    cap!("get_nearby_enemies", Free, "Visible monsters with direction, distance, threat and status"),
    cap!("get_messages", Free, "Most recent game messages", opt("n", Integer)),
    cap!("get_landmarks", Free, "Known stairs, altars and (failing those) doors"),
    cap!("read_ui", Free, "Text of the open menu, popup or prompt"),
    cap!("examine", Free, "Describe an inventory item", req("slot", Slot)),
    cap!("narrate", Free, "Record a thought; resets the narration counter", req("thought", Text)),
    // Turn actions
    cap!("move", Turn, "Step one tile", req("direction", Direction)),
    cap!("attack", Turn, "Melee attack in a direction", req("direction", Direction)),
    cap!("auto_explore", Turn, "Explore until something interesting happens"),
    cap!("auto_fight", Turn, "Attack the nearest enemy"),
    cap!("rest", Turn, "Rest until healed or interrupted"),
    cap!("wait_turn", Turn, "Pass one turn"),
    cap!("go_upstairs", Turn, "Climb stairs, travelling to the nearest if not on them"),
    cap!("go_downstairs", Turn, "Descend stairs, travelling to the nearest if not on them"),
    cap!("travel", Turn, "Interlevel travel to a destination such as '>' or a branch", req("destination", Text)),
    cap!("pickup", Turn, "Pick up items here"),
    cap!("wield", Turn, "Wield a weapon", req("slot", Slot)),
    cap!("wear", Turn, "Put on armour", req("slot", Slot)),
    cap!("quaff", Turn, "Drink a potion", req("slot", Slot)),
    cap!("read_scroll", Turn, "Read a scroll", req("slot", Slot)),
    cap!("drop", Turn, "Drop an item", req("slot", Slot)),
    cap!("zap_wand", Turn, "Zap a wand, optionally aimed", req("slot", Slot), opt("direction", Direction)),
    cap!("evoke", Turn, "Evoke an item", req("slot", Slot)),
    cap!("throw_item", Turn, "Throw or fire an item", req("slot", Slot), req("direction", Direction)),
    cap!("put_on_jewelry", Turn, "Put on a ring or amulet", req("slot", Slot)),
    cap!("remove_jewelry", Turn, "Remove a ring or amulet", opt("slot", Slot)),
    cap!("take_off_armour", Turn, "Take off armour", req("slot", Slot)),
    cap!("use_ability", Turn, "Use an ability by its menu key", req("key", Key)),
    cap!("cast_spell", Turn, "Cast a spell by its key, optionally aimed", req("key", Key), opt("direction", Direction)),
    cap!("pray", Turn, "Pray to your god"),
    cap!("send_keys", Turn, "Send raw keys; no turn check is made", req("keys", Text)),
    cap!("quit", Turn, "Abandon the character (deletes the save)"),
    cap!("save_and_exit", Turn, "Save the game and return to the lobby"),
    // Meta actions, allowed while UI is open
    cap!("select_menu_item", Meta, "Press a menu hotkey", req("key", Key)),
    cap!("dismiss", Meta, "Close the open menu or popup"),
    cap!("acknowledge", Meta, "Continue past a --more-- page"),
    cap!("confirm", Meta, "Answer yes"),
    cap!("deny", Meta, "Answer no"),
    cap!("respond", Meta, "Type an answer to a text prompt", req("text", Text)),
    cap!("choose_stat", Meta, "Pick the level-up attribute", req("stat", Stat)),
    cap!("escape", Meta, "Press Escape"),
    cap!("resync", Meta, "Clear stuck UI and ask the server to redraw"),
];

pub fn find(name: &str) -> Option<&'static CapabilitySpec> {
    CATALOGUE.iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = CATALOGUE.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), CATALOGUE.len());
    }

    #[test]
    fn costs_match_expectations() {
        assert_eq!(find("get_map").map(|c| c.cost), Some(Cost::Free));
        assert_eq!(find("choose_stat").map(|c| c.cost), Some(Cost::Meta));
        assert_eq!(find("quit").map(|c| c.cost), Some(Cost::Turn));
        assert!(find("teleport").is_none());
        let throw = find("throw_item").unwrap();
        assert!(throw.params.iter().all(|p| p.required));
    }
}
