//! Canonical game snapshot built from server messages.
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::webtiles::protocol::{
    CloseReason, ItemUpdate, MapUpdate, MonsterInfo, PlayerUpdate, Position, StatusEffect,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub ac: i32,
    pub ev: i32,
    pub sh: i32,
    pub strength: i32,
    pub intelligence: i32,
    pub dexterity: i32,
    pub xl: i32,
    pub xl_progress: i32,
    pub place: String,
    pub depth: i32,
    pub god: String,
    pub piety_rank: i32,
    pub penance: bool,
    pub gold: i64,
    pub turn: i64,
    pub elapsed_time: i64,
    pub species: String,
    pub title: String,
    pub position: Position,
    pub poison_survival: i32,
    pub status_effects: Vec<StatusEffect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Equipped {
    Weapon,
    Offhand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub slot: char,
    pub name: String,
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inscription: Option<String>,
    pub useless: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipped: Option<Equipped>,
}

/// Inventory letter for a server slot index: 0..26 are `a-z`, 26..52 `A-Z`.
pub fn slot_letter(index: u8) -> Option<char> {
    match index {
        0..=25 => Some((b'a' + index) as char),
        26..=51 => Some((b'A' + index - 26) as char),
        _ => None,
    }
}

/// Bounded, append-only log. Each line gets a sequence number so callers can
/// ask for "everything since sequence N" even after old lines were evicted.
#[derive(Debug, Clone)]
pub struct MessageLog {
    lines: VecDeque<String>,
    capacity: usize,
    next_seq: u64,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.next_seq += 1;
    }

    /// Sequence number the next appended line will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained lines appended at or after `seq`.
    pub fn since(&self, seq: u64) -> Vec<String> {
        let first_retained = self.next_seq - self.lines.len() as u64;
        let skip = seq.saturating_sub(first_retained) as usize;
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tile {
    pub glyph: String,
    pub feature: Option<i64>,
    pub fg: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Monster {
    pub id: Option<i64>,
    pub name: String,
    pub threat: i64,
}

/// Sparse level map keyed by absolute server coordinates.
#[derive(Debug, Clone, Default)]
pub struct MapGrid {
    pub tiles: HashMap<Position, Tile>,
    pub monsters: HashMap<Position, Monster>,
    /// Later monster updates often omit the name; remember it by id.
    names: HashMap<i64, String>,
}

impl MapGrid {
    pub fn apply(&mut self, update: &MapUpdate) {
        if update.clear {
            self.tiles.clear();
            self.monsters.clear();
        }
        for cell in &update.cells {
            let pos = Position { x: cell.x, y: cell.y };
            let tile = self.tiles.entry(pos).or_default();
            if let Some(glyph) = &cell.glyph {
                tile.glyph = glyph.clone();
            }
            if let Some(feature) = cell.feature {
                tile.feature = Some(feature);
            }
            if let Some(fg) = cell.fg {
                tile.fg = fg;
            }
            match &cell.monster {
                None => {}
                Some(None) => {
                    self.monsters.remove(&pos);
                }
                Some(Some(info)) => self.update_monster(pos, info),
            }
        }
    }

    fn update_monster(&mut self, pos: Position, info: &MonsterInfo) {
        if let (Some(id), Some(name)) = (info.id, &info.name) {
            self.names.insert(id, name.clone());
        }
        let entry = self.monsters.entry(pos).or_default();
        if info.id.is_some() {
            entry.id = info.id;
        }
        if let Some(name) = &info.name {
            entry.name = name.clone();
        } else if entry.name.is_empty() {
            if let Some(known) = entry.id.and_then(|id| self.names.get(&id)) {
                entry.name = known.clone();
            }
        }
        if let Some(threat) = info.threat {
            entry.threat = threat;
        }
    }

    pub fn glyph_at(&self, pos: Position) -> Option<&str> {
        self.tiles.get(&pos).map(|t| t.glyph.as_str()).filter(|g| !g.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub stats: PlayerStats,
    pub inventory: BTreeMap<u8, Item>,
    pub messages: MessageLog,
    pub map: MapGrid,
    weapon_index: Option<u8>,
    offhand_index: Option<u8>,
    close_reason: Option<CloseReason>,
}

impl GameState {
    pub fn new(message_log_capacity: usize) -> Self {
        Self {
            stats: PlayerStats::default(),
            inventory: BTreeMap::new(),
            messages: MessageLog::new(message_log_capacity),
            map: MapGrid::default(),
            weapon_index: None,
            offhand_index: None,
            close_reason: None,
        }
    }

    pub fn turn(&self) -> i64 {
        self.stats.turn
    }

    /// True only after the server closed the session with a death reason.
    pub fn is_dead(&self) -> bool {
        matches!(self.close_reason, Some(CloseReason::Death { .. }))
    }

    pub fn is_ended(&self) -> bool {
        self.close_reason.is_some()
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    pub(crate) fn close(&mut self, reason: CloseReason) {
        if self.close_reason.is_none() {
            self.close_reason = Some(reason);
        }
    }

    pub fn append_log(&mut self, lines: &[String]) {
        for line in lines {
            self.messages.push(line.clone());
        }
    }

    pub fn apply_player(&mut self, p: &PlayerUpdate) {
        let s = &mut self.stats;
        macro_rules! set {
            ($($field:ident <- $src:ident),* $(,)?) => {
                $( if let Some(v) = &p.$src { s.$field = v.clone(); } )*
            };
        }
        set!(
            hp <- hp, max_hp <- hp_max, mp <- mp, max_mp <- mp_max,
            ac <- ac, ev <- ev, sh <- sh,
            strength <- strength, intelligence <- intelligence, dexterity <- dexterity,
            xl <- xl, xl_progress <- progress, place <- place, depth <- depth,
            god <- god, piety_rank <- piety_rank, penance <- penance, gold <- gold,
            elapsed_time <- time, species <- species, title <- title,
            position <- pos, poison_survival <- poison_survival,
            status_effects <- status,
        );
        if let Some(turn) = p.turn {
            // Never step backwards within a game.
            s.turn = s.turn.max(turn);
        }
        if let Some(idx) = p.weapon_index {
            self.weapon_index = u8::try_from(idx).ok();
        }
        if let Some(idx) = p.offhand_index {
            self.offhand_index = u8::try_from(idx).ok();
        }
        if let Some(inv) = &p.inv {
            for (key, update) in inv {
                let Ok(index) = key.parse::<u8>() else {
                    continue;
                };
                match update {
                    Some(update) => self.merge_item(index, update),
                    None => {
                        self.inventory.remove(&index);
                    }
                }
            }
        }
        self.refresh_equipped();
    }

    fn merge_item(&mut self, index: u8, update: &ItemUpdate) {
        let Some(slot) = slot_letter(index) else {
            return;
        };
        let item = self.inventory.entry(index).or_insert_with(|| Item {
            slot,
            name: String::new(),
            quantity: 1,
            inscription: None,
            useless: false,
            equipped: None,
        });
        if let Some(name) = &update.name {
            item.name = name.clone();
        }
        if let Some(quantity) = update.quantity {
            item.quantity = quantity;
        }
        if let Some(inscription) = &update.inscription {
            item.inscription = (!inscription.is_empty()).then(|| inscription.clone());
        }
        if let Some(useless) = update.useless {
            item.useless = useless;
        }
        // An emptied slot arrives as a nameless record.
        if item.name.is_empty() || item.name == "?" || item.quantity <= 0 {
            self.inventory.remove(&index);
        }
    }

    fn refresh_equipped(&mut self) {
        for (index, item) in self.inventory.iter_mut() {
            item.equipped = if Some(*index) == self.weapon_index {
                Some(Equipped::Weapon)
            } else if Some(*index) == self.offhand_index {
                Some(Equipped::Offhand)
            } else {
                None
            };
        }
    }

    pub fn item_in_slot(&self, slot: char) -> Option<&Item> {
        self.inventory.values().find(|item| item.slot == slot)
    }
}
