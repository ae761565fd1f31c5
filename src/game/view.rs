//! Plain-text renderings of the session for the free query capabilities.
use serde::Serialize;

use super::session::SessionState;
use super::state::{Equipped, GameState};
use super::ui::{ActiveUi, Menu, Popup, Prompt, PromptKind, UiState};
use crate::webtiles::protocol::Position;

/// Beyond this Chebyshev distance monsters are not reported.
const ENEMY_RANGE: i32 = 8;

/// Scenery the server reports as monsters.
const HARMLESS: &[&str] = &[
    "plant",
    "withered plant",
    "fungus",
    "toadstool",
    "bush",
    "ballistomycete spore",
    "briar patch",
    "pillar of salt",
    "block of ice",
    "spectral weapon",
];

// Foreground tile flags (behaviour and damage bits).
const BEH_MASK: u64 = 0x0070_0000;
const BEH_SLEEPING: u64 = 0x0010_0000;
const BEH_UNAWARE: u64 = 0x0020_0000;
const BEH_FLEEING: u64 = 0x0030_0000;
const BEH_PARALYSED: u64 = 0x0040_0000;
const MDAM_MASK: u64 = 0x1_C000_0000;
const MDAM_LIGHT: u64 = 0x0_4000_0000;
const MDAM_MODERATE: u64 = 0x0_8000_0000;
const MDAM_HEAVY: u64 = 0x0_C000_0000;
const MDAM_SEVERE: u64 = 0x1_0000_0000;
const MDAM_ALMOST_DEAD: u64 = 0x1_C000_0000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnemyView {
    pub name: String,
    pub dx: i32,
    pub dy: i32,
    pub direction: String,
    pub distance: i32,
    pub threat: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LandmarkView {
    pub kind: &'static str,
    pub glyph: String,
    pub direction: String,
    pub distance: i32,
    pub dx: i32,
    pub dy: i32,
}

fn compass(dx: i32, dy: i32) -> String {
    let mut dir = String::new();
    if dy < 0 {
        dir.push('n');
    } else if dy > 0 {
        dir.push('s');
    }
    if dx > 0 {
        dir.push('e');
    } else if dx < 0 {
        dir.push('w');
    }
    if dir.is_empty() {
        dir.push_str("here");
    }
    dir
}

fn chebyshev(dx: i32, dy: i32) -> i32 {
    dx.abs().max(dy.abs())
}

/// ASCII map centred on the player.
pub fn render_map(game: &GameState, radius: i32) -> String {
    if game.map.is_empty() {
        return "No map data available".to_string();
    }
    let Position { x: px, y: py } = game.stats.position;
    let mut lines = Vec::with_capacity((radius * 2 + 1) as usize);
    for y in (py - radius)..=(py + radius) {
        let mut line = String::with_capacity((radius * 2 + 1) as usize);
        for x in (px - radius)..=(px + radius) {
            if (x, y) == (px, py) {
                line.push('@');
            } else {
                line.push_str(game.map.glyph_at(Position { x, y }).unwrap_or(" "));
            }
        }
        lines.push(line.trim_end().to_string());
    }
    lines.join("\n")
}

pub fn stats_line(game: &GameState) -> String {
    let s = &game.stats;
    let who = if s.species.is_empty() {
        "Unknown".to_string()
    } else {
        format!("{} {}", s.species, s.title).trim().to_string()
    };
    let mut hp = format!("HP: {}/{}", s.hp, s.max_hp);
    if s.poison_survival > 0 && s.poison_survival < s.hp {
        hp.push_str(&format!(" (->{} after poison)", s.poison_survival));
    }
    let mut god = if s.god.is_empty() { "None".to_string() } else { s.god.clone() };
    if !s.god.is_empty() && s.piety_rank > 0 {
        let rank = s.piety_rank.clamp(0, 6) as usize;
        god.push_str(&format!(" [{}{}]", "*".repeat(rank), ".".repeat(6 - rank)));
    }
    if s.penance {
        god.push_str(" (PENANCE)");
    }
    let status: Vec<&str> = s.status_effects.iter().filter_map(|e| e.label()).collect();
    let status = if status.is_empty() {
        String::new()
    } else {
        format!(" | Status: {}", status.join(", "))
    };
    format!(
        "Character: {} | {} | MP: {}/{} | AC: {} EV: {} SH: {} | Str: {} Int: {} Dex: {} | XL: {} ({}%) | Gold: {} | Place: {}:{} | God: {}{} | Turn: {}",
        who, hp, s.mp, s.max_mp, s.ac, s.ev, s.sh, s.strength, s.intelligence, s.dexterity,
        s.xl, s.xl_progress, s.gold, s.place, s.depth, god, status, s.turn
    )
}

pub fn inventory_lines(game: &GameState) -> Vec<String> {
    game.inventory
        .values()
        .map(|item| {
            let mut line = format!("{}) {}", item.slot, item.name);
            match item.equipped {
                Some(Equipped::Weapon) => line.push_str(" (wielded)"),
                Some(Equipped::Offhand) => line.push_str(" (offhand)"),
                None => {}
            }
            if item.useless {
                line.push_str(" [useless]");
            }
            if let Some(inscription) = &item.inscription {
                line.push_str(&format!(" {{{}}}", inscription));
            }
            line
        })
        .collect()
}

fn monster_status(fg: u64) -> String {
    let mut parts = Vec::new();
    match fg & BEH_MASK {
        BEH_SLEEPING => parts.push("sleeping"),
        BEH_UNAWARE => parts.push("unaware"),
        BEH_FLEEING => parts.push("fleeing"),
        BEH_PARALYSED => parts.push("paralysed"),
        _ => {}
    }
    match fg & MDAM_MASK {
        MDAM_LIGHT => parts.push("lightly wounded"),
        MDAM_MODERATE => parts.push("moderately wounded"),
        MDAM_HEAVY => parts.push("heavily wounded"),
        MDAM_SEVERE => parts.push("severely wounded"),
        MDAM_ALMOST_DEAD => parts.push("almost dead"),
        _ => {}
    }
    parts.join(", ")
}

fn threat_label(threat: i64) -> String {
    match threat {
        0 => "trivial".to_string(),
        1 => "easy".to_string(),
        2 => "dangerous".to_string(),
        3 => "extremely dangerous".to_string(),
        other => format!("unknown({})", other),
    }
}

pub fn nearby_enemies(game: &GameState) -> Vec<EnemyView> {
    let Position { x: px, y: py } = game.stats.position;
    let mut enemies: Vec<EnemyView> = game
        .map
        .monsters
        .iter()
        .filter_map(|(pos, mon)| {
            let (dx, dy) = (pos.x - px, pos.y - py);
            let distance = chebyshev(dx, dy);
            let lower = mon.name.to_lowercase();
            if distance > ENEMY_RANGE || (dx, dy) == (0, 0) || HARMLESS.contains(&lower.as_str()) {
                return None;
            }
            let fg = game.map.tiles.get(pos).map(|t| t.fg).unwrap_or(0);
            Some(EnemyView {
                name: if mon.name.is_empty() { "unknown".to_string() } else { mon.name.clone() },
                dx,
                dy,
                direction: compass(dx, dy),
                distance,
                threat: threat_label(mon.threat),
                status: monster_status(fg),
            })
        })
        .collect();
    enemies.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.name.cmp(&b.name)));
    enemies
}

pub fn enemy_lines(game: &GameState) -> Vec<String> {
    nearby_enemies(game)
        .into_iter()
        .map(|e| {
            let status = if e.status.is_empty() { String::new() } else { format!(", {}", e.status) };
            format!("{} ({}, dist {}, threat {}{})", e.name, e.direction, e.distance, e.threat, status)
        })
        .collect()
}

pub fn landmarks(game: &GameState) -> Vec<LandmarkView> {
    let Position { x: px, y: py } = game.stats.position;
    let kind_of = |glyph: &str| match glyph {
        ">" => Some((0, "downstairs")),
        "<" => Some((1, "upstairs")),
        "_" => Some((2, "altar")),
        "+" => Some((3, "door")),
        _ => None,
    };
    let mut found: Vec<(u8, LandmarkView)> = game
        .map
        .tiles
        .iter()
        .filter_map(|(pos, tile)| {
            let (order, kind) = kind_of(&tile.glyph)?;
            let (dx, dy) = (pos.x - px, pos.y - py);
            Some((
                order,
                LandmarkView {
                    kind,
                    glyph: tile.glyph.clone(),
                    direction: compass(dx, dy),
                    distance: chebyshev(dx, dy),
                    dx,
                    dy,
                },
            ))
        })
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.distance.cmp(&b.1.distance)));
    // Doors only matter when nothing better is known.
    let has_non_door = found.iter().any(|(order, _)| *order < 3);
    found
        .into_iter()
        .filter(|(order, _)| !has_non_door || *order < 3)
        .take(10)
        .map(|(_, view)| view)
        .collect()
}

pub fn landmark_lines(game: &GameState) -> Vec<String> {
    let views = landmarks(game);
    if views.is_empty() {
        return vec!["No landmarks discovered yet.".to_string()];
    }
    views
        .into_iter()
        .map(|l| {
            format!(
                "{} ({}) - {}, {} tiles away (dx={}, dy={})",
                l.kind, l.glyph, l.direction, l.distance, l.dx, l.dy
            )
        })
        .collect()
}

fn render_menu(menu: &Menu) -> Vec<String> {
    let title = if menu.title.is_empty() { "Menu" } else { menu.title.as_str() };
    let mut lines = vec![format!("=== {} (type: {}) ===", title, if menu.tag.is_empty() { "unknown" } else { menu.tag.as_str() })];
    if !menu.more.is_empty() {
        lines.push(menu.more.clone());
    }
    for item in &menu.items {
        if item.text.trim().is_empty() {
            continue;
        }
        if item.level < 2 {
            lines.push(format!("  {}", item.text));
        } else if let Some(key) = item.hotkey {
            lines.push(format!("  [{}] {}", key, item.text));
        } else {
            lines.push(format!("      {}", item.text));
        }
    }
    lines
}

fn render_popup(popup: &Popup) -> Vec<String> {
    let kind = if popup.kind.is_empty() { "unknown" } else { popup.kind.as_str() };
    let mut lines = vec![format!("=== Popup: {} ===", kind)];
    for text in [&popup.title, &popup.body, &popup.prompt].into_iter().chain(popup.details.iter()) {
        if !text.is_empty() {
            lines.push(text.clone());
        }
    }
    lines
}

fn render_prompt(prompt: &Prompt) -> Vec<String> {
    let hint = match prompt.kind {
        PromptKind::StatIncrease => "Answer with choose_stat: S (Strength), I (Intelligence) or D (Dexterity).",
        PromptKind::YesNo => "Answer with confirm or deny.",
        PromptKind::FreeText => "Answer with respond, or escape to cancel.",
    };
    let mut lines = vec!["=== Prompt ===".to_string()];
    if !prompt.text.is_empty() {
        lines.push(prompt.text.clone());
    }
    lines.push(hint.to_string());
    lines
}

pub fn read_ui(ui: &UiState) -> Vec<String> {
    match &ui.active {
        Some(ActiveUi::Menu(menu)) => render_menu(menu),
        Some(ActiveUi::Popup(popup)) => render_popup(popup),
        Some(ActiveUi::Prompt(prompt)) => render_prompt(prompt),
        None => vec![format!("No menu or popup is currently open (input mode: {}).", ui.mode)],
    }
}

/// Combined overview: stats, recent log, inventory, enemies, UI.
pub fn state_text(session: &SessionState) -> String {
    let game = &session.game;
    let mut parts = vec!["=== DCSS State ===".to_string(), stats_line(game), String::new(), "--- Messages ---".to_string()];
    parts.extend(game.messages.recent(5).into_iter().map(|m| format!("  {}", m)));
    let inventory = inventory_lines(game);
    if !inventory.is_empty() {
        parts.push(String::new());
        parts.push("--- Inventory ---".to_string());
        parts.extend(inventory.into_iter().map(|l| format!("  {}", l)));
    }
    let enemies = enemy_lines(game);
    if !enemies.is_empty() {
        parts.push(String::new());
        parts.push("--- Enemies ---".to_string());
        parts.extend(enemies.into_iter().map(|l| format!("  {}", l)));
    }
    if session.ui.active.is_some() {
        parts.push(String::new());
        parts.extend(read_ui(&session.ui));
    }
    if let Some(reason) = game.close_reason() {
        parts.push(String::new());
        if game.is_dead() {
            parts.push("*** GAME OVER - YOU ARE DEAD ***".to_string());
        } else {
            parts.push(format!("*** SESSION ENDED ({}) ***", reason.label()));
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webtiles::protocol::{decode, ProtocolMessage};
    use serde_json::json;

    fn session_with(values: Vec<serde_json::Value>) -> SessionState {
        let mut s = SessionState::new(50);
        s.apply(&ProtocolMessage::GameStarted);
        for v in values {
            s.apply(&decode(v).unwrap());
        }
        s
    }

    #[test]
    fn map_is_centred_on_player() {
        let s = session_with(vec![
            json!({"msg":"player","pos":{"x":5,"y":5}}),
            json!({"msg":"map","cells":[{"x":4,"y":4,"g":"#"},{"g":"#"},{"g":"#"},{"x":4,"y":5,"g":"."},{"g":"."},{"g":">"}]}),
        ]);
        assert_eq!(render_map(&s.game, 1), "###\n.@>\n");
    }

    #[test]
    fn enemies_are_filtered_and_decoded() {
        let s = session_with(vec![
            json!({"msg":"player","pos":{"x":0,"y":0}}),
            json!({"msg":"map","cells":[
                {"x":2,"y":-1,"g":"g","mon":{"id":1,"name":"goblin","threat":1},"fg":[1074790400,0]},
                {"x":1,"y":1,"g":"P","mon":{"id":2,"name":"plant","threat":0}},
                {"x":20,"y":0,"g":"O","mon":{"id":3,"name":"ogre","threat":3}}
            ]}),
        ]);
        let enemies = nearby_enemies(&s.game);
        assert_eq!(enemies.len(), 1);
        assert_eq!(enemies[0].direction, "ne");
        assert_eq!(enemies[0].distance, 2);
        assert_eq!(enemies[0].threat, "easy");
        assert_eq!(enemies[0].status, "sleeping, lightly wounded");
    }

    #[test]
    fn landmarks_hide_doors_when_stairs_known() {
        let s = session_with(vec![
            json!({"msg":"player","pos":{"x":0,"y":0}}),
            json!({"msg":"map","cells":[{"x":1,"y":0,"g":"+"},{"x":0,"y":3,"g":">"},{"x":-2,"y":0,"g":"<"}]}),
        ]);
        let lines = landmark_lines(&s.game);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("downstairs (>) - s, 3 tiles away"));
        assert!(lines[1].starts_with("upstairs (<) - w, 2"));
    }

    #[test]
    fn read_ui_renders_menu_hotkeys() {
        let s = session_with(vec![json!({"msg":"menu","tag":"pickup","title":"Pick up what?",
            "items":[{"text":"Potions","level":1},{"text":"a potion of curing","hotkeys":[97]}]})]);
        let lines = read_ui(&s.ui);
        assert_eq!(lines[0], "=== Pick up what? (type: pickup) ===");
        assert!(lines.contains(&"  [a] a potion of curing".to_string()));
    }

    #[test]
    fn state_text_reports_death() {
        let s = session_with(vec![
            json!({"msg":"player","species":"Minotaur","title":"Fighter","hp":0,"hp_max":18}),
            json!({"msg":"game_ended","reason":"dead","message":"Killed by a jackal"}),
        ]);
        let text = state_text(&s);
        assert!(text.contains("Character: Minotaur Fighter"));
        assert!(text.contains("GAME OVER"));
    }
}
