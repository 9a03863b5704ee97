//! 命令类型与追问上下文
//!
//! CommandType 是封闭集：新增命令需要同时补 Executor 分支与分类器 prompt。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 命令类型（封闭集，wire 上为 snake_case 字符串）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// 查询日历事件
    CalendarCheck,
    /// 新建日历事件
    CalendarAdd,
    /// 查看最近邮件
    EmailCheck,
    /// 发送邮件（强制追问收件人）
    EmailSend,
    /// 起草邮件（强制追问收件人）
    EmailDraft,
    /// 本地文件搜索
    FileSearch,
    /// 检索历史会话
    StoreSearch,
    /// 启动本地应用
    AppLaunch,
    /// 一般问答（oracle 直接给出答案）
    GeneralQuestion,
}

impl CommandType {
    /// 从 wire 字符串解析；不在封闭集内返回 None（由调用方转为 Oracle 失败）
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.trim().to_lowercase())).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::CalendarCheck => "calendar_check",
            CommandType::CalendarAdd => "calendar_add",
            CommandType::EmailCheck => "email_check",
            CommandType::EmailSend => "email_send",
            CommandType::EmailDraft => "email_draft",
            CommandType::FileSearch => "file_search",
            CommandType::StoreSearch => "store_search",
            CommandType::AppLaunch => "app_launch",
            CommandType::GeneralQuestion => "general_question",
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(self, CommandType::EmailSend | CommandType::EmailDraft)
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 追问上下文：问题、待补参数名、携带的不透明上下文（如邮件草稿）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowupContext {
    pub question: String,
    /// 直接策略下，追问答案原样写入该参数；缺省时走间接策略（再次分类）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_to_update: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl FollowupContext {
    pub fn ask(question: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            parameter_to_update: Some(parameter.into()),
            context: Map::new(),
        }
    }

    /// 不变量：question 与 parameter_to_update 均非空才算完整
    pub fn is_complete(&self) -> bool {
        !self.question.is_empty()
            && self
                .parameter_to_update
                .as_deref()
                .is_some_and(|p| !p.is_empty())
    }
}

/// 结构化命令：类型 + 参数 + 追问状态 + 最终响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_type: CommandType,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub requires_followup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_context: Option<FollowupContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl Command {
    pub fn new(command_type: CommandType) -> Self {
        Self {
            command_type,
            parameters: Map::new(),
            requires_followup: false,
            followup_context: None,
            response: None,
        }
    }

    /// 读取字符串参数（裁剪空白；空串视为缺失）
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn set_param(&mut self, key: &str, value: impl Into<Value>) {
        self.parameters.insert(key.to_string(), value.into());
    }

    /// 设置追问并维护 requires_followup ⇔ followup_context 不变量
    pub fn with_followup(mut self, ctx: FollowupContext) -> Self {
        self.requires_followup = true;
        self.followup_context = Some(ctx);
        self
    }

    /// 解除追问状态（参数已补齐时调用）
    pub fn clear_followup(&mut self) {
        self.requires_followup = false;
        self.followup_context = None;
    }

    /// 校验追问不变量是否成立
    pub fn followup_invariant_holds(&self) -> bool {
        match (&self.requires_followup, &self.followup_context) {
            (true, Some(ctx)) => ctx.is_complete(),
            (false, None) => true,
            _ => false,
        }
    }
}
