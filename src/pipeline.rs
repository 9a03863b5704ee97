//! 主管线编排
//!
//! Assistant 把各组件串成一条链：分类 → 校验 →（追问分支：存待定 + 发问 /
//! 执行分支：执行 → 格式化 → 播报），并把每轮写入上下文存储。任何失败
//! 路径都会产生可播报的话术，绝不静默；触及待定状态的错误路径一律清槽。

use std::sync::Arc;

use chrono_tz::Tz;

use crate::command::Command;
use crate::config::AppConfig;
use crate::context::{ContextStore, ConversationTurn, InMemoryContextStore};
use crate::error::AssistantError;
use crate::executor::CommandExecutor;
use crate::format::Formatter;
use crate::llm::{CommandClassifier, LlmClient};
use crate::session::{FollowupHandler, PendingStore};
use crate::tools::{
    AppLaunchTool, CalendarProvider, EmailProvider, FileSearchOptions, InMemoryCalendar,
    InMemoryMailbox, ToolRegistry,
};
use crate::voice::{NoopSpeaker, Speaker};

/// 助理主体：持有分类器、执行器、上下文存储、待定槽与追问处理器
pub struct Assistant {
    classifier: Arc<CommandClassifier>,
    executor: Arc<CommandExecutor>,
    store: Arc<dyn ContextStore>,
    pending: Arc<PendingStore>,
    followup: FollowupHandler,
    speaker: Arc<dyn Speaker>,
    max_context_turns: usize,
}

impl Assistant {
    /// 组装全部组件；providers 可注入（测试用内存实现，生产替换为真实后端）
    pub fn new(
        llm: Arc<dyn LlmClient>,
        calendar: Arc<dyn CalendarProvider>,
        email: Arc<dyn EmailProvider>,
        store: Arc<dyn ContextStore>,
        speaker: Arc<dyn Speaker>,
        cfg: &AppConfig,
    ) -> Result<Self, AssistantError> {
        let tz: Tz = cfg
            .app
            .timezone
            .parse()
            .map_err(|_| AssistantError::Config(format!("bad timezone: {}", cfg.app.timezone)))?;

        let file_opts = if cfg.tools.file_search.roots.is_empty() {
            FileSearchOptions {
                max_results: cfg.tools.file_search.max_results,
                budget: std::time::Duration::from_secs(cfg.tools.file_search.budget_secs),
                ..Default::default()
            }
        } else {
            FileSearchOptions {
                roots: cfg.tools.file_search.roots.clone(),
                max_results: cfg.tools.file_search.max_results,
                budget: std::time::Duration::from_secs(cfg.tools.file_search.budget_secs),
            }
        };

        let mut formatter = Formatter::new();
        if cfg.llm.summarize_responses {
            formatter = formatter.with_llm(llm.clone());
        }

        let classifier = Arc::new(CommandClassifier::new(
            llm,
            cfg.app.max_context_turns,
            cfg.llm.request_timeout_secs,
        ));
        let mut tools = ToolRegistry::new();
        tools.register(AppLaunchTool::new(cfg.tools.app_launch.allowed_apps.clone()));
        let executor = Arc::new(CommandExecutor::new(
            calendar,
            email,
            store.clone(),
            tools,
            formatter,
            speaker.clone(),
            file_opts,
            tz,
            cfg.tools.calendar.default_event_minutes,
            cfg.tools.tool_timeout_secs,
        ));
        let pending = Arc::new(PendingStore::new());
        let followup = FollowupHandler::new(classifier.clone(), executor.clone(), pending.clone());

        Ok(Self {
            classifier,
            executor,
            store,
            pending,
            followup,
            speaker,
            max_context_turns: cfg.app.max_context_turns,
        })
    }

    /// 全内存的默认装配（本地循环与测试用）
    pub fn in_memory(llm: Arc<dyn LlmClient>, cfg: &AppConfig) -> Result<Self, AssistantError> {
        Self::new(
            llm,
            Arc::new(InMemoryCalendar::new()),
            Arc::new(InMemoryMailbox::new()),
            Arc::new(InMemoryContextStore::default()),
            Arc::new(NoopSpeaker),
            cfg,
        )
    }

    pub fn pending(&self) -> &Arc<PendingStore> {
        &self.pending
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// 处理一条新话语：分类 → 校验 → 追问或执行，并记录会话轮
    ///
    /// 失败时已向用户播报过道歉话术；调用方只需把错误转成传输层信封。
    pub async fn process(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        text: &str,
    ) -> Result<Command, AssistantError> {
        let history = self
            .store
            .recent_context(user_id, chat_id, self.max_context_turns)
            .await;

        let mut cmd = match self.classifier.classify(text, &history).await {
            Ok(c) => c,
            Err(e) => {
                // 分类失败：清掉可能残留的待定状态，播报道歉
                self.pending.clear(user_id).await;
                self.speaker.speak(&e.user_message()).await;
                return Err(e);
            }
        };

        if cmd.requires_followup {
            let question = cmd
                .followup_context
                .as_ref()
                .map(|c| c.question.clone())
                .unwrap_or_default();
            self.pending.put(user_id, cmd.clone()).await;
            cmd.response = Some(question.clone());
            self.speaker.speak(&question).await;
        } else {
            let (formatted, _raw) = self.executor.execute(user_id, &cmd).await;
            cmd.response = Some(formatted);
        }

        self.record_turn(user_id, chat_id, text, &cmd).await;
        Ok(cmd)
    }

    /// 处理一轮追问答案（cancelled 为传输层的显式取消信号）
    pub async fn resolve_followup(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        text: &str,
        cancelled: bool,
    ) -> Result<Command, AssistantError> {
        let cmd = match self.followup.resolve(user_id, text, cancelled).await {
            Ok(c) => c,
            Err(e) => {
                self.speaker.speak(&e.user_message()).await;
                return Err(e);
            }
        };

        // 执行分支在 Executor 内已播报；发问与取消在这里补播报
        if cancelled || cmd.requires_followup {
            if let Some(resp) = &cmd.response {
                self.speaker.speak(resp).await;
            }
        }

        self.record_turn(user_id, chat_id, text, &cmd).await;
        Ok(cmd)
    }

    async fn record_turn(&self, user_id: &str, chat_id: Option<&str>, query: &str, cmd: &Command) {
        let turn = ConversationTurn::new(
            user_id,
            chat_id.map(str::to_string),
            query,
            cmd.response.clone().unwrap_or_default(),
        )
        .with_followup(cmd.followup_context.clone());
        self.store.store_turn(turn).await;
    }
}
