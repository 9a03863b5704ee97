//! 管线集成测试：分类 → 追问 → 合并 → 执行 的完整闭环

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aria::config::AppConfig;
    use aria::context::{ContextStore, InMemoryContextStore};
    use aria::error::AssistantError;
    use aria::llm::MockLlmClient;
    use aria::tools::{CalendarProvider, InMemoryCalendar, InMemoryMailbox};
    use aria::voice::NoopSpeaker;
    use aria::{Assistant, CommandType};

    struct Fixture {
        assistant: Assistant,
        calendar: Arc<InMemoryCalendar>,
        mailbox: Arc<InMemoryMailbox>,
        store: Arc<InMemoryContextStore>,
    }

    fn fixture(replies: Vec<&str>) -> Fixture {
        let calendar = Arc::new(InMemoryCalendar::new());
        let mailbox = Arc::new(InMemoryMailbox::new());
        let store = Arc::new(InMemoryContextStore::default());
        let assistant = Assistant::new(
            Arc::new(MockLlmClient::scripted(replies)),
            calendar.clone(),
            mailbox.clone(),
            store.clone(),
            Arc::new(NoopSpeaker),
            &AppConfig::default(),
        )
        .unwrap();
        Fixture {
            assistant,
            calendar,
            mailbox,
            store,
        }
    }

    #[tokio::test]
    async fn calendar_add_followup_cycle() {
        let f = fixture(vec![
            r#"{"command_type": "calendar_add", "parameters": {"title": "Dentist", "date": "tomorrow"}, "requires_followup": false}"#,
        ]);

        let cmd = f
            .assistant
            .process("u1", Some("c1"), "schedule a dentist appointment tomorrow")
            .await
            .unwrap();
        assert_eq!(cmd.command_type, CommandType::CalendarAdd);
        assert!(cmd.requires_followup);
        let ctx = cmd.followup_context.as_ref().unwrap();
        assert_eq!(ctx.parameter_to_update.as_deref(), Some("time"));
        assert!(f.assistant.pending().has_pending("u1").await);

        // 直接策略：原话作为 time 值并入后立即执行
        let done = f
            .assistant
            .resolve_followup("u1", Some("c1"), "2:00 PM", false)
            .await
            .unwrap();
        assert!(!done.requires_followup);
        assert!(!f.assistant.pending().has_pending("u1").await);

        use aria::tools::resolve_timeframe;
        use chrono::Utc;
        let now = Utc::now().with_timezone(&chrono_tz::America::New_York);
        let window = resolve_timeframe("tomorrow", now);
        let events = f.calendar.list_events(&window, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "Dentist");
    }

    #[tokio::test]
    async fn email_send_forces_recipient_then_delivers() {
        let f = fixture(vec![
            r#"{"command_type": "email_send", "parameters": {"subject": "Greetings", "body": "Hello there"}, "requires_followup": false}"#,
        ]);

        let cmd = f
            .assistant
            .process("u1", None, "send an email saying hello")
            .await
            .unwrap();
        assert!(cmd.requires_followup);
        let ctx = cmd.followup_context.as_ref().unwrap();
        assert_eq!(ctx.parameter_to_update.as_deref(), Some("to"));
        // 草稿随追问上下文一起保存
        assert!(ctx.context.contains_key("current_draft"));
        assert_eq!(f.mailbox.outbox_len().await, 0);

        let done = f
            .assistant
            .resolve_followup("u1", None, "bob@example.com", false)
            .await
            .unwrap();
        assert!(!done.requires_followup);
        assert_eq!(f.mailbox.outbox_len().await, 1);
        assert!(!f.assistant.pending().has_pending("u1").await);
    }

    #[tokio::test]
    async fn cancellation_clears_pending_without_executing() {
        let f = fixture(vec![
            r#"{"command_type": "email_send", "parameters": {"body": "see you soon"}, "requires_followup": false}"#,
        ]);

        f.assistant
            .process("u1", None, "email matt")
            .await
            .unwrap();
        assert!(f.assistant.pending().has_pending("u1").await);

        let cmd = f
            .assistant
            .resolve_followup("u1", None, "never mind", true)
            .await
            .unwrap();
        assert!(cmd.response.as_deref().unwrap_or("").contains("cancelled"));
        assert_eq!(f.mailbox.outbox_len().await, 0);
        assert_eq!(f.mailbox.drafts_len().await, 0);
        assert!(!f.assistant.pending().has_pending("u1").await);
    }

    #[tokio::test]
    async fn followup_without_session_is_reported() {
        let f = fixture(vec![]);
        let err = f
            .assistant
            .resolve_followup("nobody", None, "2 PM", false)
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Session(_)));
        assert!(err.user_message().contains("No active session"));
    }

    #[tokio::test]
    async fn turns_are_recorded_across_the_cycle() {
        let f = fixture(vec![
            r#"{"command_type": "file_search", "parameters": {}, "requires_followup": false}"#,
            r#"{"command_type": "general_question", "parameters": {"response": "Rust is a systems language."}, "requires_followup": false}"#,
        ]);

        f.assistant
            .process("u1", Some("c1"), "find my files")
            .await
            .unwrap();
        f.assistant
            .resolve_followup("u1", Some("c1"), "resume", false)
            .await
            .unwrap();
        f.assistant
            .process("u1", Some("c1"), "what is rust")
            .await
            .unwrap();

        let turns = f.store.recent_context("u1", Some("c1"), 10).await;
        assert_eq!(turns.len(), 3);
        // 时间升序，首轮是追问
        assert_eq!(turns[0].query, "find my files");
        assert!(turns[0].requires_followup);
        assert!(!turns[2].requires_followup);
        assert_eq!(turns[2].query, "what is rust");
    }
}
