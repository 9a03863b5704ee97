//! 追问状态机
//!
//! 状态：Idle →（分类产生追问）AwaitingFollowup →（答案补齐）Idle，
//! 或自循环 AwaitingFollowup（合并后的命令仍缺参数）。自循环有显式深度
//! 上限；合并/执行中的任何错误都清除待定槽位并向用户报错，绝不留下
//! 悬挂的 AwaitingFollowup。
//!
//! 两种合并策略：
//! - 直接策略：followup_context.parameter_to_update 命名了参数时，
//!   追问答案原样写入该参数，立即重新校验/执行（不再调 oracle）
//! - 间接策略：未命名参数时，答案本身再走一次分类，把得到的参数并入

use std::sync::Arc;

use serde_json::Value;

use crate::command::{validate, Command};
use crate::error::AssistantError;
use crate::executor::CommandExecutor;
use crate::llm::CommandClassifier;
use crate::session::PendingStore;

/// 追问自循环深度上限（源实现无上限，这里显式封顶）
pub const MAX_FOLLOWUP_DEPTH: u8 = 3;

/// 追问处理器：消费后续话语，合并参数并重新驱动执行
pub struct FollowupHandler {
    classifier: Arc<CommandClassifier>,
    executor: Arc<CommandExecutor>,
    pending: Arc<PendingStore>,
}

impl FollowupHandler {
    pub fn new(
        classifier: Arc<CommandClassifier>,
        executor: Arc<CommandExecutor>,
        pending: Arc<PendingStore>,
    ) -> Self {
        Self {
            classifier,
            executor,
            pending,
        }
    }

    /// 处理一轮追问答案；cancelled 为显式取消信号（不触工具，直接清槽）
    pub async fn resolve(
        &self,
        user_id: &str,
        utterance: &str,
        cancelled: bool,
    ) -> Result<Command, AssistantError> {
        let mut guard = self.pending.guard(user_id).await;
        let Some(mut entry) = guard.take() else {
            return Err(AssistantError::Session(
                "no active session for follow-up".to_string(),
            ));
        };

        if cancelled {
            // 槽位已清（take），直接给取消话术
            let mut cmd = entry.command;
            cmd.clear_followup();
            cmd.response = Some("Okay, I've cancelled that request.".to_string());
            return Ok(cmd);
        }

        let merged = self
            .merge_answer(&entry.command, utterance)
            .await
            .and_then(validate);
        let mut cmd = match merged {
            Ok(c) => c,
            Err(e) => {
                // 槽位保持清除状态，错误向上转为用户可见话术
                tracing::warn!(user_id = %user_id, error = %e, "follow-up merge failed, pending cleared");
                return Err(e);
            }
        };

        if cmd.requires_followup {
            // 自循环：合并后的命令又缺别的参数
            entry.depth += 1;
            if entry.depth >= MAX_FOLLOWUP_DEPTH {
                tracing::warn!(user_id = %user_id, "follow-up depth limit reached, clearing session");
                return Err(AssistantError::Session(format!(
                    "too many follow-up rounds (limit {})",
                    MAX_FOLLOWUP_DEPTH
                )));
            }
            let question = cmd
                .followup_context
                .as_ref()
                .map(|c| c.question.clone())
                .unwrap_or_default();
            cmd.response = Some(question);
            entry.command = cmd.clone();
            *guard = Some(entry);
            return Ok(cmd);
        }

        // 参数齐了：执行并回填响应，槽位保持清除
        let (formatted, _raw) = self.executor.execute(user_id, &cmd).await;
        cmd.response = Some(formatted);
        Ok(cmd)
    }

    /// 合并答案到待定命令；间接策略会再调一次分类器
    async fn merge_answer(
        &self,
        pending: &Command,
        utterance: &str,
    ) -> Result<Command, AssistantError> {
        let parameter = pending
            .followup_context
            .as_ref()
            .and_then(|c| c.parameter_to_update.clone());

        let mut cmd = pending.clone();
        match parameter {
            Some(param) => {
                // 直接策略：答案原样作为参数值
                cmd.set_param(&param, utterance.trim());
            }
            None => {
                // 间接策略：答案再分类，优先取 value 字段，否则并入全部标量参数
                let follow = self.classifier.classify(utterance, &[]).await?;
                if let Some(v) = follow.parameters.get("value") {
                    cmd.set_param("value", v.clone());
                } else {
                    for (k, v) in follow.parameters.iter() {
                        if !matches!(v, Value::Null) && k != "response" {
                            cmd.set_param(k, v.clone());
                        }
                    }
                }
            }
        }
        cmd.clear_followup();
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandType, FollowupContext};
    use crate::context::InMemoryContextStore;
    use crate::format::Formatter;
    use crate::llm::MockLlmClient;
    use crate::tools::{AppLaunchTool, FileSearchOptions, InMemoryCalendar, InMemoryMailbox};
    use crate::voice::NoopSpeaker;

    fn handler(mailbox: Arc<InMemoryMailbox>) -> FollowupHandler {
        handler_with(Arc::new(MockLlmClient::new()), mailbox)
    }

    fn handler_with(llm: Arc<MockLlmClient>, mailbox: Arc<InMemoryMailbox>) -> FollowupHandler {
        let mut tools = crate::tools::ToolRegistry::new();
        tools.register(AppLaunchTool::new(vec![]));
        let executor = Arc::new(CommandExecutor::new(
            Arc::new(InMemoryCalendar::new()),
            mailbox,
            Arc::new(InMemoryContextStore::default()),
            tools,
            Formatter::new(),
            Arc::new(NoopSpeaker),
            FileSearchOptions {
                roots: vec![],
                ..Default::default()
            },
            "America/New_York".parse().unwrap(),
            60,
            5,
        ));
        FollowupHandler::new(
            Arc::new(CommandClassifier::new(llm, 5, 5)),
            executor,
            Arc::new(PendingStore::new()),
        )
    }

    fn pending_calendar_add_missing_time() -> Command {
        let mut c = Command::new(CommandType::CalendarAdd);
        c.set_param("title", "dentist");
        c.set_param("date", "tomorrow");
        c.with_followup(FollowupContext::ask("What time?", "time"))
    }

    #[tokio::test]
    async fn no_session_is_reported_not_crashed() {
        let h = handler(Arc::new(InMemoryMailbox::new()));
        let err = h.resolve("ghost", "2 PM", false).await.unwrap_err();
        assert!(matches!(err, AssistantError::Session(_)));
    }

    #[tokio::test]
    async fn direct_strategy_merges_and_clears() {
        let h = handler(Arc::new(InMemoryMailbox::new()));
        h.pending.put("u1", pending_calendar_add_missing_time()).await;

        let cmd = h.resolve("u1", "2:00 PM", false).await.unwrap();
        assert_eq!(cmd.param_str("time"), Some("2:00 PM"));
        assert!(!cmd.requires_followup);
        assert!(cmd.response.is_some());
        assert!(!h.pending.has_pending("u1").await);
    }

    #[tokio::test]
    async fn cancellation_skips_tools_and_clears() {
        let mailbox = Arc::new(InMemoryMailbox::new());
        let h = handler(mailbox.clone());
        let mut pending = Command::new(CommandType::EmailSend);
        pending.set_param("subject", "Hi");
        pending.set_param("body", "x");
        let pending = pending.with_followup(FollowupContext::ask("Who to?", "to"));
        h.pending.put("u1", pending).await;

        let cmd = h.resolve("u1", "", true).await.unwrap();
        assert!(cmd.response.unwrap().contains("cancelled"));
        assert!(!h.pending.has_pending("u1").await);
        // 没有触到任何工具能力
        assert_eq!(mailbox.outbox_len().await, 0);
        assert_eq!(mailbox.drafts_len().await, 0);
    }

    /// 仅有问题、未命名参数的追问上下文（间接策略入口）
    fn question_only(question: &str) -> FollowupContext {
        FollowupContext {
            question: question.to_string(),
            parameter_to_update: None,
            context: Default::default(),
        }
    }

    #[tokio::test]
    async fn indirect_strategy_reclassifies_and_merges() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"command_type": "calendar_add", "parameters": {"date": "tomorrow", "time": "9 AM"}, "requires_followup": false}"#,
        ]));
        let h = handler_with(llm, Arc::new(InMemoryMailbox::new()));

        let mut c = Command::new(CommandType::CalendarAdd);
        c.set_param("title", "standup");
        h.pending
            .put("u1", c.with_followup(question_only("When should it happen?")))
            .await;

        let cmd = h.resolve("u1", "tomorrow morning at nine", false).await.unwrap();
        // 答案经再次分类，参数并入待定命令后立即执行
        assert_eq!(cmd.param_str("date"), Some("tomorrow"));
        assert_eq!(cmd.param_str("time"), Some("9 AM"));
        assert_eq!(cmd.param_str("title"), Some("standup"));
        assert!(!cmd.requires_followup);
        assert!(cmd.response.is_some());
        assert!(!h.pending.has_pending("u1").await);
    }

    #[tokio::test]
    async fn indirect_strategy_prefers_value_parameter() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"command_type": "calendar_check", "parameters": {"value": "tomorrow", "timeframe": "next_week"}, "requires_followup": false}"#,
        ]));
        let h = handler_with(llm, Arc::new(InMemoryMailbox::new()));

        h.pending
            .put(
                "u1",
                Command::new(CommandType::CalendarCheck)
                    .with_followup(question_only("Which day did you mean?")),
            )
            .await;

        let cmd = h.resolve("u1", "tomorrow", false).await.unwrap();
        // 有 value 字段时只并入它，其余参数不并入
        assert_eq!(cmd.param_str("value"), Some("tomorrow"));
        assert!(cmd.param_str("timeframe").is_none());
        assert!(!cmd.requires_followup);
        assert!(!h.pending.has_pending("u1").await);
    }

    #[tokio::test]
    async fn selfloop_asks_again_until_depth_cap() {
        let h = handler(Arc::new(InMemoryMailbox::new()));
        // 只有 title：补完 date 还缺 time（自循环）
        let mut c = Command::new(CommandType::CalendarAdd);
        c.set_param("title", "standup");
        let c = c.with_followup(FollowupContext::ask("What day?", "date"));
        h.pending.put("u1", c).await;

        let again = h.resolve("u1", "tomorrow", false).await.unwrap();
        assert!(again.requires_followup);
        assert_eq!(
            again.followup_context.as_ref().unwrap().parameter_to_update.as_deref(),
            Some("time")
        );
        assert!(h.pending.has_pending("u1").await);

        // 第二轮答案补齐收尾
        let done = h.resolve("u1", "9 AM", false).await.unwrap();
        assert!(!done.requires_followup);
        assert!(!h.pending.has_pending("u1").await);
    }

    #[tokio::test]
    async fn depth_cap_clears_session() {
        let h = handler(Arc::new(InMemoryMailbox::new()));
        let c = Command::new(CommandType::CalendarAdd)
            .with_followup(FollowupContext::ask("Title?", "nonsense"));
        h.pending.put("u1", c).await;

        // title/date/time 逐轮补齐也要三轮，第三轮触发深度上限
        let mut last = None;
        for i in 0..MAX_FOLLOWUP_DEPTH + 1 {
            match h.resolve("u1", &format!("answer {}", i), false).await {
                Ok(cmd) => {
                    assert!(cmd.requires_followup);
                    // 重新放回的待定命令继续用校验器给出的追问
                    last = Some(cmd);
                }
                Err(e) => {
                    assert!(matches!(e, AssistantError::Session(_)));
                    assert!(!h.pending.has_pending("u1").await);
                    return;
                }
            }
        }
        panic!("depth cap never hit, last = {:?}", last);
    }
}
