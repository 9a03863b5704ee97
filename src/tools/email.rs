//! 邮件能力
//!
//! EmailProvider 是邮箱后端的窄接口（最近 / 搜索 / 起草 / 发送）；
//! InMemoryMailbox 为内存实现（收件箱 + 草稿箱 + 发件箱）。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 邮件元数据（列表视图用；snippet 截断到 100 字符）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: DateTime<Utc>,
    pub snippet: String,
}

/// 正文转 snippet：超过 100 字符截断加省略号
pub fn snippet_of(body: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    if chars.len() > 100 {
        format!("{}...", chars[..100].iter().collect::<String>())
    } else {
        body.to_string()
    }
}

/// 邮箱后端的窄接口
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// 最近邮件（最新在前，最多 max_results 条）
    async fn recent(&self, max_results: usize) -> Result<Vec<EmailMessage>, String>;

    /// 按关键词搜索（主题/发件人/摘要）
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EmailMessage>, String>;

    /// 起草：不投递，返回草稿
    async fn draft(&self, to: &str, subject: &str, body: &str) -> Result<EmailMessage, String>;

    /// 发送：立即投递，返回已发送邮件
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<EmailMessage, String>;
}

/// 内存邮箱：inbox 供查询，drafts/outbox 记录动作结果
#[derive(Default)]
pub struct InMemoryMailbox {
    inbox: RwLock<Vec<EmailMessage>>,
    drafts: RwLock<Vec<EmailMessage>>,
    outbox: RwLock<Vec<EmailMessage>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试/演示用：向收件箱塞一封邮件
    pub async fn deliver(&self, sender: &str, subject: &str, body: &str) {
        self.inbox.write().await.push(EmailMessage {
            id: uuid::Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            sender: sender.to_string(),
            date: Utc::now(),
            snippet: snippet_of(body),
        });
    }

    pub async fn outbox_len(&self) -> usize {
        self.outbox.read().await.len()
    }

    pub async fn drafts_len(&self) -> usize {
        self.drafts.read().await.len()
    }

    fn compose(to: &str, subject: &str, body: &str) -> EmailMessage {
        EmailMessage {
            id: uuid::Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            sender: format!("me -> {}", to),
            date: Utc::now(),
            snippet: snippet_of(body),
        }
    }
}

#[async_trait]
impl EmailProvider for InMemoryMailbox {
    async fn recent(&self, max_results: usize) -> Result<Vec<EmailMessage>, String> {
        let inbox = self.inbox.read().await;
        let mut list: Vec<EmailMessage> = inbox.iter().cloned().collect();
        list.sort_by(|a, b| b.date.cmp(&a.date));
        list.truncate(max_results);
        Ok(list)
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<EmailMessage>, String> {
        let q = query.to_lowercase();
        let inbox = self.inbox.read().await;
        let mut hits: Vec<EmailMessage> = inbox
            .iter()
            .filter(|m| {
                m.subject.to_lowercase().contains(&q)
                    || m.sender.to_lowercase().contains(&q)
                    || m.snippet.to_lowercase().contains(&q)
            })
            .cloned()
            .collect();
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn draft(&self, to: &str, subject: &str, body: &str) -> Result<EmailMessage, String> {
        let msg = Self::compose(to, subject, body);
        self.drafts.write().await.push(msg.clone());
        Ok(msg)
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<EmailMessage, String> {
        let msg = Self::compose(to, subject, body);
        self.outbox.write().await.push(msg.clone());
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncates_at_100() {
        let long = "x".repeat(150);
        let s = snippet_of(&long);
        assert_eq!(s.chars().count(), 103);
        assert!(s.ends_with("..."));
        assert_eq!(snippet_of("short"), "short");
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let mb = InMemoryMailbox::new();
        mb.deliver("a@example.com", "first", "one").await;
        mb.deliver("b@example.com", "second", "two").await;
        let recent = mb.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].date >= recent[1].date);
    }

    #[tokio::test]
    async fn send_and_draft_are_separate() {
        let mb = InMemoryMailbox::new();
        mb.draft("ada@example.com", "Hi", "draft body").await.unwrap();
        mb.send("ada@example.com", "Hi", "sent body").await.unwrap();
        assert_eq!(mb.drafts_len().await, 1);
        assert_eq!(mb.outbox_len().await, 1);
    }
}
