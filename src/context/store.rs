//! 上下文存储：trait 与内存实现
//!
//! 接口按相似度存储的形状设计（upsert / 过滤查询 / 删除），内存实现用
//! 关键词重叠做检索打分，另维护按用户的时间序索引供 recent_context 使用。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::turn::{ChatSession, ConversationTurn};

/// 上下文存储 trait：追加会话轮、按时间取最近、相似度检索、按用户清除
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// 追加一条会话轮（append-only）
    async fn store_turn(&self, turn: ConversationTurn);

    /// 最近 limit 条，时间升序；chat_id 给定时按会话过滤
    async fn recent_context(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        limit: usize,
    ) -> Vec<ConversationTurn>;

    /// 相似度检索该用户的历史轮（最多 k 条，按相关度降序）
    async fn search(&self, user_id: &str, query: &str, k: usize) -> Vec<ConversationTurn>;

    /// 清除该用户的全部历史
    async fn clear(&self, user_id: &str);

    /// 取聊天会话元数据
    async fn chat_session(&self, chat_id: &str) -> Option<ChatSession>;
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> std::collections::HashSet<String> {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 内存实现：按用户维护时间序 Vec，检索时按词重叠打分
pub struct InMemoryContextStore {
    turns: RwLock<HashMap<String, Vec<ConversationTurn>>>,
    chats: RwLock<HashMap<String, ChatSession>>,
    max_turns_per_user: usize,
}

impl InMemoryContextStore {
    pub fn new(max_turns_per_user: usize) -> Self {
        Self {
            turns: RwLock::new(HashMap::new()),
            chats: RwLock::new(HashMap::new()),
            max_turns_per_user,
        }
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn store_turn(&self, turn: ConversationTurn) {
        if let Some(chat_id) = turn.chat_id.clone() {
            let mut chats = self.chats.write().await;
            let session = chats
                .entry(chat_id.clone())
                .or_insert_with(|| ChatSession::new(chat_id, turn.user_id.clone()));
            session.record_message(&turn.query);
        }

        let mut turns = self.turns.write().await;
        let list = turns.entry(turn.user_id.clone()).or_default();
        list.push(turn);
        let n = list.len();
        if n > self.max_turns_per_user {
            list.drain(0..n - self.max_turns_per_user);
        }
    }

    async fn recent_context(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        limit: usize,
    ) -> Vec<ConversationTurn> {
        let turns = self.turns.read().await;
        let Some(list) = turns.get(user_id) else {
            return Vec::new();
        };
        let filtered: Vec<&ConversationTurn> = list
            .iter()
            .filter(|t| chat_id.is_none() || t.chat_id.as_deref() == chat_id)
            .collect();
        filtered[filtered.len().saturating_sub(limit)..]
            .iter()
            .map(|t| (*t).clone())
            .collect()
    }

    async fn search(&self, user_id: &str, query: &str, k: usize) -> Vec<ConversationTurn> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let turns = self.turns.read().await;
        let Some(list) = turns.get(user_id) else {
            return Vec::new();
        };
        let mut scored: Vec<(usize, &ConversationTurn)> = list
            .iter()
            .map(|t| {
                let doc_tokens = tokenize_lower(&format!("{} {}", t.query, t.response));
                (query_tokens.intersection(&doc_tokens).count(), t)
            })
            .filter(|(s, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(k).map(|(_, t)| t.clone()).collect()
    }

    async fn clear(&self, user_id: &str) {
        self.turns.write().await.remove(user_id);
        self.chats
            .write()
            .await
            .retain(|_, s| s.user_id != user_id);
    }

    async fn chat_session(&self, chat_id: &str) -> Option<ChatSession> {
        self.chats.read().await.get(chat_id).cloned()
    }
}
