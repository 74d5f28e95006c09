//! # Command Desk
//!
//! User-facing commands for querying codes and managing push subscriptions.
//! The hosting chat runtime hands over the sender's origin id, the raw text
//! and whether the sender is an administrator; the desk returns the replies
//! to post back, in order.
//!
//! | Command            | Who   | Effect                                        |
//! |--------------------|-------|-----------------------------------------------|
//! | `兑换码 <game>`     | all   | list codes that are still valid               |
//! | `兑换码网站`         | all   | site link                                     |
//! | `订阅兑换码`         | all   | subscribe origin to pushes                    |
//! | `取消订阅兑换码`      | all   | unsubscribe origin                            |
//! | `兑换码订阅状态`      | all   | report subscription state                     |
//! | `订阅测试`           | admin | send a test message to every subscriber       |
//! | `订阅列表查询`        | admin | list subscribers                              |
//! | `重载订阅列表`        | admin | reload subscribers from storage and list them |

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use crate::core::games::Game;
use crate::core::registry::SubscriberRegistry;
use crate::core::relay::MessageSender;
use crate::error::RelayError;
use crate::retrieve::code_api::{valid_codes, CodeLookup};

const QUERY_HELP: &str = "输入【/兑换码 游戏】获取兑换码";
const QUERY_USAGE: &str = "输入【】内的指令【/兑换码 help】获取帮助";
const NO_CODES: &str = "暂无兑换码";
const NO_SUBSCRIBERS: &str = "❌没有订阅用户";
const ADMIN_ONLY: &str = "❌ 该指令仅限管理员使用";
const BROADCAST_TEST: &str = "订阅广播测试!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command<'a> {
    Query(&'a str),
    Site,
    Subscribe,
    Unsubscribe,
    Status,
    BroadcastTest,
    ListSubscribers,
    ReloadSubscribers,
}

impl<'a> Command<'a> {
    /// Recognizes `name [argument]`, with or without a leading `/`.
    fn parse(text: &'a str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix('/').unwrap_or(text);
        let (name, arg) = match text.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (text, ""),
        };
        let command = match name {
            "兑换码" => Command::Query(arg),
            "兑换码网站" => Command::Site,
            "订阅兑换码" => Command::Subscribe,
            "取消订阅兑换码" => Command::Unsubscribe,
            "兑换码订阅状态" => Command::Status,
            "订阅测试" => Command::BroadcastTest,
            "订阅列表查询" => Command::ListSubscribers,
            "重载订阅列表" => Command::ReloadSubscribers,
            _ => return None,
        };
        Some(command)
    }

    fn admin_only(self) -> bool {
        matches!(
            self,
            Command::BroadcastTest | Command::ListSubscribers | Command::ReloadSubscribers
        )
    }
}

pub struct CommandDesk {
    registry: Arc<SubscriberRegistry>,
    lookup: Arc<dyn CodeLookup>,
    sender: Arc<dyn MessageSender>,
    site_url: String,
}

impl CommandDesk {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        lookup: Arc<dyn CodeLookup>,
        sender: Arc<dyn MessageSender>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            lookup,
            sender,
            site_url: site_url.into(),
        }
    }

    /// Replies for `text`. Unrecognized text yields no replies.
    pub async fn handle(&self, origin: &str, text: &str, is_admin: bool) -> Vec<String> {
        self.handle_at(origin, text, is_admin, Local::now().naive_local())
            .await
    }

    /// As [`handle`](Self::handle), judging code validity against `now`.
    pub async fn handle_at(
        &self,
        origin: &str,
        text: &str,
        is_admin: bool,
        now: NaiveDateTime,
    ) -> Vec<String> {
        let Some(command) = Command::parse(text) else {
            return Vec::new();
        };
        if command.admin_only() && !is_admin {
            log::warn!("Refused admin command from {}: {}", origin, text.trim());
            return vec![ADMIN_ONLY.to_string()];
        }

        match command {
            Command::Query(alias) => self.query(alias, now).await,
            Command::Site => vec![self.site_url.clone()],
            Command::Subscribe => vec![self.subscribe(origin)],
            Command::Unsubscribe => vec![self.unsubscribe(origin)],
            Command::Status => {
                log::info!("Subscription status queried by {}", origin);
                if self.registry.contains(origin) {
                    vec!["✅ 您当前已订阅兑换码推送".to_string()]
                } else {
                    vec!["❌ 您当前未订阅兑换码推送".to_string()]
                }
            }
            Command::BroadcastTest => {
                self.broadcast_test().await;
                Vec::new()
            }
            Command::ListSubscribers => vec![self.subscriber_list()],
            Command::ReloadSubscribers => match self.registry.reload() {
                Ok(_) => vec!["✅ 刷新成功".to_string(), self.subscriber_list()],
                Err(e) => vec![format!("❌ 刷新失败: {}", e)],
            },
        }
    }

    async fn query(&self, alias: &str, now: NaiveDateTime) -> Vec<String> {
        if matches!(alias, "帮助" | "help") {
            return vec![QUERY_HELP.to_string()];
        }
        let Some(game) = Game::from_alias(alias) else {
            return vec![QUERY_USAGE.to_string()];
        };

        match self.lookup.fetch_codes(game).await {
            Ok(records) => {
                let mut replies = valid_codes(&records, now);
                if replies.is_empty() {
                    replies.push(NO_CODES.to_string());
                }
                replies.push(format!("详细信息请查看 {}", self.site_url));
                replies
            }
            Err(RelayError::Lookup(message)) => vec![message],
            Err(e) => vec![e.to_string()],
        }
    }

    fn subscribe(&self, origin: &str) -> String {
        if self.registry.subscribe(origin) {
            "✅ 订阅成功！当有新的兑换码时，我们将会通知您".to_string()
        } else {
            "您已经订阅了兑换码推送，无需重复订阅".to_string()
        }
    }

    fn unsubscribe(&self, origin: &str) -> String {
        if self.registry.unsubscribe(origin) {
            "✅ 已取消订阅兑换码推送".to_string()
        } else {
            "您当前没有订阅兑换码推送".to_string()
        }
    }

    async fn broadcast_test(&self) {
        for subscriber in self.registry.snapshot() {
            if let Err(e) = self.sender.send(&subscriber, BROADCAST_TEST).await {
                log::error!("Test broadcast to {} failed: {}", subscriber, e);
            }
        }
    }

    fn subscriber_list(&self) -> String {
        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            return NO_SUBSCRIBERS.to_string();
        }
        subscribers.iter().map(|s| format!("{s}\n")).collect()
    }
}
