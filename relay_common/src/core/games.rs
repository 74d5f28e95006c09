//! # Game Catalogue
//!
//! The fixed mapping between upstream game identifiers, their display names
//! and the command aliases users type. Also owns the expiry date-time format
//! shared by the event formatter and the on-demand lookup.

use chrono::NaiveDateTime;

/// Format of every expiry string the upstream produces, e.g. `2099/01/01 00:00:00`.
pub const EXPIRY_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Games known to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Game {
    Infinity,
    Shining,
    DeepSpace,
}

impl Game {
    pub const ALL: [Game; 3] = [Game::Infinity, Game::Shining, Game::DeepSpace];

    /// Upstream identifier, also used as the lookup API path segment.
    pub fn id(self) -> &'static str {
        match self {
            Game::Infinity => "infinity",
            Game::Shining => "shining",
            Game::DeepSpace => "deepspace",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Game::Infinity => "无限暖暖",
            Game::Shining => "闪耀暖暖",
            Game::DeepSpace => "恋与深空",
        }
    }

    pub fn from_id(id: &str) -> Option<Game> {
        Game::ALL.into_iter().find(|g| g.id() == id)
    }

    /// Resolves what a user typed after the query command.
    pub fn from_alias(alias: &str) -> Option<Game> {
        match alias.trim() {
            "暖5" | "无限暖暖" | "无暖" => Some(Game::Infinity),
            "暖4" | "闪耀暖暖" | "闪暖" => Some(Game::Shining),
            "深空" | "恋与深空" => Some(Game::DeepSpace),
            _ => None,
        }
    }
}

/// Human-readable name for an upstream game id. Unknown ids pass through verbatim.
pub fn display_name(game_id: &str) -> &str {
    match Game::from_id(game_id) {
        Some(game) => game.display_name(),
        None => game_id,
    }
}

pub fn parse_expiry(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), EXPIRY_FORMAT).ok()
}

/// True when `expiry` parses and lies strictly after `now`.
pub fn is_still_valid(expiry: &str, now: NaiveDateTime) -> bool {
    parse_expiry(expiry).is_some_and(|end| now < end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> NaiveDateTime {
        parse_expiry(raw).unwrap()
    }

    #[test]
    fn known_ids_map_to_display_names() {
        assert_eq!(display_name("infinity"), "无限暖暖");
        assert_eq!(display_name("shining"), "闪耀暖暖");
        assert_eq!(display_name("deepspace"), "恋与深空");
    }

    #[test]
    fn unknown_ids_pass_through() {
        assert_eq!(display_name("genshin"), "genshin");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(Game::from_alias("暖5"), Some(Game::Infinity));
        assert_eq!(Game::from_alias(" 闪暖 "), Some(Game::Shining));
        assert_eq!(Game::from_alias("恋与深空"), Some(Game::DeepSpace));
        assert_eq!(Game::from_alias("infinity"), None);
    }

    #[test]
    fn validity_compares_against_now() {
        let now = at("2025/06/01 12:00:00");
        assert!(is_still_valid("2025/06/01 12:00:01", now));
        assert!(!is_still_valid("2025/06/01 12:00:00", now));
        assert!(!is_still_valid("2024/12/31 23:59:59", now));
    }

    #[test]
    fn unparsable_expiry_is_never_valid() {
        let now = at("2025/06/01 12:00:00");
        assert!(!is_still_valid("2099-01-01 00:00:00", now));
        assert!(!is_still_valid("soon", now));
    }
}
