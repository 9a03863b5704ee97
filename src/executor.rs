//! 命令执行器（分发器）
//!
//! 按 command_type 把已校验的命令路由到对应能力；任何能力层失败都在此
//! 转为 {"error": ...} 原始结果，绝不让下游错误击穿管线。执行后总是经过
//! 格式化器与播报协作方，向上返回格式化文本与原始结果。

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::command::{Command, CommandType};
use crate::context::ContextStore;
use crate::format::Formatter;
use crate::tools::{
    calendar::{parse_natural_date, parse_time, resolve_timeframe, TimeWindow},
    file_search::{search_files, FileSearchOptions},
    CalendarProvider, EmailProvider, ToolRegistry,
};
use crate::voice::Speaker;

/// 收件人地址形状校验（发送前最后一道防线）
fn valid_email(addr: &str) -> bool {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
        .is_match(addr.trim())
}

/// 命令执行器：持有各能力提供方、Tool 注册表、格式化器与播报方
pub struct CommandExecutor {
    calendar: Arc<dyn CalendarProvider>,
    email: Arc<dyn EmailProvider>,
    store: Arc<dyn ContextStore>,
    tools: ToolRegistry,
    formatter: Formatter,
    speaker: Arc<dyn Speaker>,
    file_opts: FileSearchOptions,
    tz: Tz,
    default_event_minutes: i64,
    tool_timeout: Duration,
}

impl CommandExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        calendar: Arc<dyn CalendarProvider>,
        email: Arc<dyn EmailProvider>,
        store: Arc<dyn ContextStore>,
        tools: ToolRegistry,
        formatter: Formatter,
        speaker: Arc<dyn Speaker>,
        file_opts: FileSearchOptions,
        tz: Tz,
        default_event_minutes: i64,
        tool_timeout_secs: u64,
    ) -> Self {
        Self {
            calendar,
            email,
            store,
            tools,
            formatter,
            speaker,
            file_opts,
            tz,
            default_event_minutes,
            tool_timeout: Duration::from_secs(tool_timeout_secs),
        }
    }

    /// 执行已校验命令：路由 → 原始结果（或 {"error"}）→ 格式化 → 播报
    pub async fn execute(&self, user_id: &str, cmd: &Command) -> (String, Value) {
        // general_question 短路：不触任何工具能力
        if cmd.command_type == CommandType::GeneralQuestion {
            let answer = cmd
                .response
                .clone()
                .or_else(|| cmd.param_str("response").map(str::to_string))
                .unwrap_or_else(|| "I don't have an answer for that.".to_string());
            self.speaker.speak(&answer).await;
            return (answer.clone(), json!({ "response": answer }));
        }

        let raw = match timeout(self.tool_timeout, self.dispatch(user_id, cmd)).await {
            Ok(raw) => raw,
            Err(_) => json!({ "error": format!("The {} operation timed out.", cmd.command_type) }),
        };

        let formatted = self.formatter.format(cmd.command_type, &raw).await;
        self.speaker.speak(&formatted).await;
        (formatted, raw)
    }

    /// 路由到能力层；每个分支把失败包成 {"error": ...}
    async fn dispatch(&self, user_id: &str, cmd: &Command) -> Value {
        match cmd.command_type {
            CommandType::CalendarCheck => self.calendar_check(cmd).await,
            CommandType::CalendarAdd => self.calendar_add(cmd).await,
            CommandType::EmailCheck => self.email_check(cmd).await,
            CommandType::EmailSend => self.email_action(cmd, true).await,
            CommandType::EmailDraft => self.email_action(cmd, false).await,
            CommandType::FileSearch => self.file_search(cmd).await,
            CommandType::StoreSearch => self.store_search(user_id, cmd).await,
            CommandType::AppLaunch => self.app_launch(cmd).await,
            CommandType::GeneralQuestion => unreachable!("short-circuited in execute"),
        }
    }

    /// 时间段解析优先级：显式 date > 显式区间 > timeframe > 默认未来 24h
    fn resolve_check_window(&self, cmd: &Command) -> Result<TimeWindow, String> {
        let now = Utc::now().with_timezone(&self.tz);
        if let Some(date) = cmd.param_str("date") {
            let day = parse_natural_date(date, now)?;
            let start = self
                .tz
                .from_local_datetime(&day.and_hms_opt(0, 0, 0).expect("valid midnight"))
                .earliest()
                .ok_or_else(|| format!("Invalid local date: {}", date))?;
            return Ok(TimeWindow {
                start,
                end: start + ChronoDuration::days(1),
            });
        }
        if let (Some(start_s), Some(end_s)) = (cmd.param_str("start_date"), cmd.param_str("end_date")) {
            let start_day = parse_natural_date(start_s, now)?;
            let end_day = parse_natural_date(end_s, now)?;
            let start = self
                .tz
                .from_local_datetime(&start_day.and_hms_opt(0, 0, 0).expect("valid midnight"))
                .earliest()
                .ok_or_else(|| format!("Invalid local date: {}", start_s))?;
            let end = self
                .tz
                .from_local_datetime(
                    &(end_day + ChronoDuration::days(1))
                        .and_hms_opt(0, 0, 0)
                        .expect("valid midnight"),
                )
                .earliest()
                .ok_or_else(|| format!("Invalid local date: {}", end_s))?;
            if end <= start {
                return Err(format!("Empty date range: {} to {}", start_s, end_s));
            }
            return Ok(TimeWindow { start, end });
        }
        if let Some(tf) = cmd.param_str("timeframe") {
            return Ok(resolve_timeframe(tf, now));
        }
        Ok(resolve_timeframe("", now))
    }

    async fn calendar_check(&self, cmd: &Command) -> Value {
        let window = match self.resolve_check_window(cmd) {
            Ok(w) => w,
            Err(e) => return json!({ "error": e }),
        };
        match self.calendar.list_events(&window, 10).await {
            Ok(events) => json!({
                "events": events,
                "window": { "start": window.start.to_rfc3339(), "end": window.end.to_rfc3339() },
            }),
            Err(e) => json!({ "error": format!("Error fetching calendar events: {}", e) }),
        }
    }

    async fn calendar_add(&self, cmd: &Command) -> Value {
        let now = Utc::now().with_timezone(&self.tz);
        let title = cmd.param_str("title").unwrap_or("Untitled Event");
        let date = cmd.param_str("date").unwrap_or("today");
        let time = cmd.param_str("time").unwrap_or("noon");

        let start = match (parse_natural_date(date, now), parse_time(time)) {
            (Ok(day), Ok(t)) => match self.tz.from_local_datetime(&day.and_time(t)).earliest() {
                Some(dt) => dt,
                None => return json!({ "error": format!("Invalid local time: {} {}", date, time) }),
            },
            (Err(e), _) | (_, Err(e)) => return json!({ "error": e }),
        };
        let end = start + ChronoDuration::minutes(self.default_event_minutes);

        match self
            .calendar
            .add_event(
                title,
                start,
                end,
                cmd.param_str("location"),
                cmd.param_str("description"),
            )
            .await
        {
            Ok(event) => json!({ "event": event }),
            Err(e) => json!({ "error": format!("Error adding calendar event: {}", e) }),
        }
    }

    async fn email_check(&self, cmd: &Command) -> Value {
        let max = cmd
            .parameters
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(5) as usize;
        // 带 query 时按关键词检索，否则取最近邮件
        let result = match cmd.param_str("query") {
            Some(query) => self.email.search(query, max).await,
            None => self.email.recent(max).await,
        };
        match result {
            Ok(emails) => json!({ "emails": emails }),
            Err(e) => json!({ "error": format!("Error fetching emails: {}", e) }),
        }
    }

    async fn email_action(&self, cmd: &Command, send: bool) -> Value {
        let Some(to) = cmd.param_str("to") else {
            return json!({ "error": "No recipient address provided." });
        };
        if !valid_email(to) {
            return json!({ "error": format!("\"{}\" doesn't look like a valid email address.", to) });
        }
        let subject = cmd.param_str("subject").unwrap_or("No Subject");
        let body = cmd
            .parameters
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or("");
        let result = if send {
            self.email.send(to, subject, body).await
        } else {
            self.email.draft(to, subject, body).await
        };
        match result {
            Ok(msg) if send => json!({ "sent": msg }),
            Ok(msg) => json!({ "draft": msg }),
            Err(e) => json!({ "error": format!("Error handling email: {}", e) }),
        }
    }

    async fn file_search(&self, cmd: &Command) -> Value {
        let Some(filename) = cmd.param_str("filename").map(str::to_string) else {
            return json!({ "error": "No file name to search for." });
        };
        let opts = self.file_opts.clone();
        let term = filename.clone();
        // walkdir 是同步 IO，放到阻塞线程池
        let results = tokio::task::spawn_blocking(move || search_files(&term, &opts)).await;
        match results {
            Ok(hits) => json!({ "search_term": filename, "results": hits }),
            Err(e) => json!({ "error": format!("File search failed: {}", e) }),
        }
    }

    async fn store_search(&self, user_id: &str, cmd: &Command) -> Value {
        let query = cmd.param_str("query").unwrap_or("");
        let hits = self.store.search(user_id, query, 5).await;
        let results: Vec<Value> = hits
            .iter()
            .map(|t| {
                json!({
                    "query": t.query,
                    "response": t.response,
                    "timestamp": t.timestamp.to_rfc3339(),
                })
            })
            .collect();
        json!({ "query": query, "results": results })
    }

    async fn app_launch(&self, cmd: &Command) -> Value {
        let args = json!({ "app_name": cmd.param_str("app_name").unwrap_or("") });
        match self
            .tools
            .execute(CommandType::AppLaunch.as_str(), args)
            .await
        {
            Ok(v) => v,
            Err(e) => json!({ "error": e }),
        }
    }
}
