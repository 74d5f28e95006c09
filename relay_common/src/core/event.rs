//! # Upstream Events
//!
//! The `new_code` payload as it arrives on the wire, its validated form, the
//! identity used for dedup, and the two-part message built for subscribers.

use serde::Deserialize;
use serde_json::Value;

use crate::core::games::display_name;
use crate::error::RelayError;

/// Field-for-field view of the wire payload. Everything is optional so that
/// validation, not deserialization, decides what counts as malformed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCodeEvent {
    #[serde(alias = "game_name", default)]
    pub game_id: Option<String>,
    #[serde(alias = "key", default)]
    pub code: Option<String>,
    #[serde(default)]
    pub reward: Option<String>,
    #[serde(alias = "time", default)]
    pub expires_at: Option<String>,
    #[serde(alias = "url", default)]
    pub source_url: Option<String>,
}

/// A validated code-availability event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEvent {
    pub game_id: String,
    pub code: String,
    pub reward: String,
    pub expires_at: String,
    pub source_url: String,
}

/// Identity of a logical event: game, code and the raw expiry string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl CodeEvent {
    /// Validates a raw wire payload. `game_id` and `code` must be non-empty.
    pub fn from_payload(payload: Value) -> Result<Self, RelayError> {
        let raw: RawCodeEvent = serde_json::from_value(payload.clone())
            .map_err(|e| RelayError::MalformedEvent(format!("{e}: {payload}")))?;
        CodeEvent::try_from(raw).map_err(|e| match e {
            RelayError::MalformedEvent(reason) => {
                RelayError::MalformedEvent(format!("{reason}: {payload}"))
            }
            other => other,
        })
    }

    pub fn dedup_key(&self) -> DedupKey {
        // Unit separator keeps ("ab","c") and ("a","bc") apart.
        DedupKey(format!(
            "{}\u{1f}{}\u{1f}{}",
            self.game_id, self.code, self.expires_at
        ))
    }

    /// Part 1: the full announcement.
    pub fn announcement(&self) -> String {
        format!(
            "🎮 {} 兑换码更新啦！\n兑换码：{}\n奖励：{}\n有效期:{}\n快上游戏兑换叭！\n源链接:{}",
            display_name(&self.game_id),
            self.code,
            self.reward,
            self.expires_at,
            self.source_url
        )
    }

    /// Both message parts, in delivery order.
    pub fn message_parts(&self) -> [String; 2] {
        [self.announcement(), self.code.clone()]
    }
}

impl TryFrom<RawCodeEvent> for CodeEvent {
    type Error = RelayError;

    fn try_from(raw: RawCodeEvent) -> Result<Self, Self::Error> {
        let game_id = non_empty(raw.game_id)
            .ok_or_else(|| RelayError::MalformedEvent("missing game_id".to_string()))?;
        let code = non_empty(raw.code)
            .ok_or_else(|| RelayError::MalformedEvent("missing code".to_string()))?;

        Ok(Self {
            game_id,
            code,
            reward: raw.reward.unwrap_or_default(),
            expires_at: raw.expires_at.unwrap_or_default(),
            source_url: raw.source_url.unwrap_or_default(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
