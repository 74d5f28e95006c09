//! # Code Lookup API
//!
//! On-demand query for the codes currently published for a game, used by the
//! `兑换码 <game>` command. Each game's list lives at `<base>/<game_id>` and is
//! a JSON array of records carrying at least `code` and `end`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Method;
use serde::Deserialize;

use crate::core::games::{is_still_valid, Game};
use crate::error::RelayError;
use crate::retrieve::ky_http::ApiClient;

/// One published code. Fields other than `code` and `end` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CodeRecord {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// Seam over the lookup so command handling can be exercised without HTTP.
#[async_trait]
pub trait CodeLookup: Send + Sync {
    /// All records for `game`. Failures carry a user-facing message in
    /// [`RelayError::Lookup`].
    async fn fetch_codes(&self, game: Game) -> Result<Vec<CodeRecord>, RelayError>;
}

pub struct CodeApi {
    client: ApiClient,
}

impl CodeApi {
    /// `base_url` is the collection root, e.g. `http://host:3000/api/codes`.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(Self {
            client: ApiClient::new(&base, None)?,
        })
    }

    pub fn endpoint(&self, game: Game) -> String {
        self.client
            .base_url()
            .join(game.id())
            .map(|url| url.to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CodeLookup for CodeApi {
    async fn fetch_codes(&self, game: Game) -> Result<Vec<CodeRecord>, RelayError> {
        let response = self
            .client
            .request::<Vec<CodeRecord>, ()>(Method::GET, game.id(), None, None)
            .await
            .map_err(|e| {
                log::error!("Code lookup for {} failed: {:#}", game.id(), e);
                RelayError::Lookup(format!("获取兑换码时发生错误: {}", e))
            })?;

        if !response.success {
            log::warn!(
                "Code lookup for {} returned HTTP {}: {}",
                game.id(),
                response.status,
                response.error_body.as_deref().unwrap_or("")
            );
            return Err(RelayError::Lookup(format!(
                "获取兑换码失败，HTTP状态码: {}",
                response.status
            )));
        }

        let records = response.data.unwrap_or_default();
        log::debug!("Code lookup for {} returned {} record(s)", game.id(), records.len());
        Ok(records)
    }
}

/// Codes whose `end` lies after `now`, in response order. Records missing
/// either field, or with an unparsable `end`, are skipped.
pub fn valid_codes(records: &[CodeRecord], now: NaiveDateTime) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| match (&record.code, &record.end) {
            (Some(code), Some(end)) if is_still_valid(end, now) => Some(code.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::games::parse_expiry;

    fn record(code: &str, end: &str) -> CodeRecord {
        CodeRecord {
            code: Some(code.to_string()),
            end: Some(end.to_string()),
        }
    }

    #[test]
    fn keeps_only_unexpired_codes() {
        let now = parse_expiry("2025/06/01 12:00:00").unwrap();
        let records = vec![
            record("OLD", "2025/05/31 23:59:59"),
            record("NEW", "2025/06/02 00:00:00"),
            record("EXACT", "2025/06/01 12:00:00"),
            record("LATER", "2030/01/01 00:00:00"),
        ];
        assert_eq!(valid_codes(&records, now), vec!["NEW", "LATER"]);
    }

    #[test]
    fn incomplete_or_unparsable_records_are_skipped() {
        let now = parse_expiry("2025/06/01 12:00:00").unwrap();
        let records = vec![
            CodeRecord {
                code: Some("NOEND".into()),
                end: None,
            },
            CodeRecord {
                code: None,
                end: Some("2030/01/01 00:00:00".into()),
            },
            record("BAD", "next week"),
        ];
        assert!(valid_codes(&records, now).is_empty());
    }

    #[test]
    fn endpoint_appends_game_id() {
        let api = CodeApi::new("http://127.0.0.1:3000/api/codes").unwrap();
        assert_eq!(api.endpoint(Game::DeepSpace), "http://127.0.0.1:3000/api/codes/deepspace");
    }

    #[test]
    fn records_decode_with_extra_fields() {
        let records: Vec<CodeRecord> = serde_json::from_str(
            r#"[{"code":"A","end":"2030/01/01 00:00:00","reward":"x","start":"y"},{"id":3}]"#,
        )
        .unwrap();
        assert_eq!(records[0], record("A", "2030/01/01 00:00:00"));
        assert_eq!(records[1], CodeRecord::default());
    }
}
