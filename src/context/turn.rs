//! 会话轮与聊天会话元数据

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::FollowupContext;

/// 一条不可变的历史记录：一问一答及当时的追问状态
///
/// id 为 UUID（时间戳做键在快速连续写入时会碰撞，这里不沿用）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
    #[serde(default)]
    pub requires_followup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_context: Option<FollowupContext>,
}

impl ConversationTurn {
    pub fn new(
        user_id: impl Into<String>,
        chat_id: Option<String>,
        query: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            chat_id,
            timestamp: Utc::now(),
            query: query.into(),
            response: response.into(),
            requires_followup: false,
            followup_context: None,
        }
    }

    pub fn with_followup(mut self, ctx: Option<FollowupContext>) -> Self {
        self.requires_followup = ctx.is_some();
        self.followup_context = ctx;
        self
    }
}

/// 聊天会话元数据：标题惰性取自第一条真实用户消息
///
/// 不变量：message_count 只增；last_updated 单调不减。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub chat_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub message_count: u64,
}

impl ChatSession {
    pub fn new(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            title: String::new(),
            created_at: now,
            last_updated: now,
            message_count: 0,
        }
    }

    /// 记一条消息：计数 +1，时间前移；标题为空时取首条用户消息（截断）
    pub fn record_message(&mut self, user_query: &str) {
        self.message_count += 1;
        let now = Utc::now();
        if now > self.last_updated {
            self.last_updated = now;
        }
        if self.title.is_empty() {
            let trimmed = user_query.trim();
            if !trimmed.is_empty() {
                self.title = trimmed.chars().take(48).collect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_roundtrips_through_json_with_timestamp() {
        let turn = ConversationTurn::new("u1", Some("c1".to_string()), "hello", "hi there");
        let wire = serde_json::to_string(&turn).unwrap();
        let back: ConversationTurn = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.id, turn.id);
        assert_eq!(back.timestamp, turn.timestamp);
        assert_eq!(back.query, "hello");
        assert!(!back.requires_followup);
    }

    #[test]
    fn chat_session_title_is_lazy_and_count_monotone() {
        let mut s = ChatSession::new("chat-1", "u1");
        assert!(s.title.is_empty());

        s.record_message("   ");
        assert!(s.title.is_empty());
        assert_eq!(s.message_count, 1);

        s.record_message("find my resume please");
        assert_eq!(s.title, "find my resume please");
        assert_eq!(s.message_count, 2);

        let before = s.last_updated;
        s.record_message("another");
        assert!(s.last_updated >= before);
        // 标题不被后续消息改写
        assert_eq!(s.title, "find my resume please");
    }
}
