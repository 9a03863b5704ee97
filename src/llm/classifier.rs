//! 命令分类器（oracle adapter）
//!
//! 把自由文本话语 + 最近会话窗口交给 LLM，得到结构化 Command；
//! 对 oracle 输出做防御式解析：JSON 不合法、命令类型不在封闭集内都转为
//! Oracle 错误而不是 panic。特例（按设计保留）：
//! - general_question 的答案从 parameters.response 提升到顶层 response
//! - email_send / email_draft 无条件强制追问收件人，草稿随 context 带走

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::command::{validate, Command, CommandType, FollowupContext};
use crate::command::validate::DEFAULT_SUBJECT;
use crate::context::ConversationTurn;
use crate::error::AssistantError;
use crate::llm::{LlmClient, Message};

/// 分类 prompt：封闭命令集与各自参数形状
const CLASSIFY_PROMPT: &str = r#"You are a command classifier for a voice assistant. Convert the user's utterance into a single JSON object:
{"command_type": "...", "parameters": {...}, "requires_followup": bool, "followup_context": {"question": "...", "parameter_to_update": "...", "context": {}}}

Valid command_type values and their parameters:
- calendar_check: {"date"?: "YYYY-MM-DD or natural", "timeframe"?: "today|tomorrow|this_week|next_week", "start_date"?, "end_date"?}
- calendar_add: {"title": str, "date": str, "time": str, "location"?: str, "description"?: str}
- email_check: {"max_results"?: int, "query"?: str, "important_only"?: bool}
- email_send: {"to"?: str, "subject"?: str, "body"?: str}
- email_draft: {"to"?: str, "subject"?: str, "body"?: str}
- file_search: {"filename": str}
- store_search: {"query": str}
- app_launch: {"app_name": str}
- general_question: {"response": str}  (answer the question yourself, put the answer in parameters.response)

Set requires_followup=true with a followup_context only when a required parameter is missing. Output the JSON object only, no prose."#;

/// 命令分类器：持有 LLM 客户端、上下文窗口大小与调用超时
pub struct CommandClassifier {
    llm: Arc<dyn LlmClient>,
    max_context_turns: usize,
    request_timeout: Duration,
}

impl CommandClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, max_context_turns: usize, request_timeout_secs: u64) -> Self {
        Self {
            llm,
            max_context_turns,
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }

    /// 分类一条话语：构建上下文窗口，调用 oracle，防御式解析，应用特例与校验
    pub async fn classify(
        &self,
        utterance: &str,
        history: &[ConversationTurn],
    ) -> Result<Command, AssistantError> {
        let mut messages = vec![Message::system(CLASSIFY_PROMPT)];

        // 最近 N 轮，时间升序，两侧各为一条消息
        let recent = &history[history.len().saturating_sub(self.max_context_turns)..];
        for turn in recent {
            messages.push(Message::user(turn.query.clone()));
            messages.push(Message::assistant(turn.response.clone()));
        }
        messages.push(Message::user(utterance));

        let reply = timeout(self.request_timeout, self.llm.complete(&messages))
            .await
            .map_err(|_| AssistantError::Timeout("classification oracle".to_string()))?
            .map_err(AssistantError::Oracle)?;

        let cmd = parse_oracle_reply(&reply)?;
        validate(cmd)
    }
}

/// 从 oracle 回复中提取并解析 Command，应用设计特例
pub fn parse_oracle_reply(reply: &str) -> Result<Command, AssistantError> {
    let raw = extract_json_object(reply)
        .ok_or_else(|| AssistantError::Oracle(format!("no JSON object in reply: {}", preview(reply))))?;

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AssistantError::Oracle(format!("unparseable reply ({}): {}", e, preview(reply))))?;

    let obj = value
        .as_object()
        .ok_or_else(|| AssistantError::Oracle("reply is not a JSON object".to_string()))?;

    let type_str = obj
        .get("command_type")
        .and_then(Value::as_str)
        .ok_or_else(|| AssistantError::Oracle("missing command_type".to_string()))?;
    let command_type = CommandType::parse(type_str)
        .ok_or_else(|| AssistantError::Oracle(format!("unknown command_type: {}", type_str)))?;

    let mut cmd = Command::new(command_type);
    if let Some(params) = obj.get("parameters").and_then(Value::as_object) {
        cmd.parameters = params.clone();
    }
    cmd.requires_followup = obj
        .get("requires_followup")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if let Some(fc) = obj.get("followup_context") {
        cmd.followup_context = serde_json::from_value(fc.clone()).ok();
    }
    // 特例先于不变量检查：邮件命令无论 oracle 怎么说都会被强制补全追问
    apply_special_cases(&mut cmd);

    if !cmd.requires_followup {
        cmd.followup_context = None;
    } else if cmd.followup_context.as_ref().map_or(true, |c| !c.is_complete()) {
        // oracle 声称要追问却没给出完整上下文，视为解析失败
        return Err(AssistantError::Oracle(
            "requires_followup without usable followup_context".to_string(),
        ));
    }

    Ok(cmd)
}

/// 设计特例：general_question 答案提升；邮件命令强制收件人追问
fn apply_special_cases(cmd: &mut Command) {
    match cmd.command_type {
        CommandType::GeneralQuestion => {
            if cmd.response.is_none() {
                cmd.response = cmd
                    .param_str("response")
                    .map(str::to_string)
                    .or_else(|| cmd.param_str("answer").map(str::to_string));
            }
            cmd.clear_followup();
        }
        CommandType::EmailSend | CommandType::EmailDraft => {
            if cmd.param_str("subject").is_none() {
                cmd.set_param("subject", DEFAULT_SUBJECT);
            }
            if cmd.parameters.get("body").and_then(Value::as_str).is_none() {
                cmd.set_param("body", "");
            }
            // 收件人永远不信任 oracle：收集收件人是强制的第二轮
            let mut ctx = FollowupContext::ask(
                "Who should I send this email to? Please provide their email address.",
                "to",
            );
            let mut draft = Map::new();
            draft.insert(
                "subject".to_string(),
                cmd.parameters
                    .get("subject")
                    .cloned()
                    .unwrap_or_else(|| Value::String(DEFAULT_SUBJECT.to_string())),
            );
            draft.insert(
                "body".to_string(),
                cmd.parameters
                    .get("body")
                    .cloned()
                    .unwrap_or(Value::String(String::new())),
            );
            ctx.context.insert("current_draft".to_string(), Value::Object(draft));
            cmd.requires_followup = true;
            cmd.followup_context = Some(ctx);
        }
        _ => {}
    }
}

/// 容忍代码围栏与前后缀散文：取第一个 '{' 到最后一个 '}' 之间的内容
fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end > start {
        Some(&reply[start..=end])
    } else {
        None
    }
}

fn preview(s: &str) -> String {
    let trimmed = s.trim();
    // 按字符截断，多字节内容不能按字节切
    if trimmed.chars().count() > 120 {
        let head: String = trimmed.chars().take(120).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply() {
        let reply = "```json\n{\"command_type\": \"file_search\", \"parameters\": {\"filename\": \"resume\"}, \"requires_followup\": false}\n```";
        let cmd = parse_oracle_reply(reply).unwrap();
        assert_eq!(cmd.command_type, CommandType::FileSearch);
        assert_eq!(cmd.param_str("filename"), Some("resume"));
    }

    #[test]
    fn unknown_type_is_oracle_failure() {
        let reply = r#"{"command_type": "bogus", "parameters": {}}"#;
        assert!(matches!(
            parse_oracle_reply(reply),
            Err(AssistantError::Oracle(_))
        ));
    }

    #[test]
    fn malformed_json_is_oracle_failure_not_panic() {
        for reply in ["not json at all", "{\"command_type\": ", "[1,2,3]"] {
            assert!(matches!(
                parse_oracle_reply(reply),
                Err(AssistantError::Oracle(_))
            ));
        }
    }

    #[test]
    fn long_multibyte_prose_is_oracle_failure_not_panic() {
        // 超过预览截断长度的非 ASCII 散文：字节 120 落在多字节字符中间
        let reply = format!("a{}", "好".repeat(60));
        assert!(matches!(
            parse_oracle_reply(&reply),
            Err(AssistantError::Oracle(_))
        ));

        let fenced = format!("{}{{\"command_type\": ", "界".repeat(130));
        assert!(matches!(
            parse_oracle_reply(&fenced),
            Err(AssistantError::Oracle(_))
        ));
    }

    #[test]
    fn general_question_answer_lifted() {
        let reply = r#"{"command_type": "general_question", "parameters": {"response": "It is 42."}, "requires_followup": false}"#;
        let cmd = parse_oracle_reply(reply).unwrap();
        assert_eq!(cmd.response.as_deref(), Some("It is 42."));
        assert!(!cmd.requires_followup);
    }

    #[test]
    fn email_followup_forced_regardless_of_oracle() {
        // oracle 说不用追问，也必须强制收集收件人
        let reply = r#"{"command_type": "email_send", "parameters": {"subject": "Hi", "body": "Lunch?"}, "requires_followup": false}"#;
        let cmd = parse_oracle_reply(reply).unwrap();
        assert!(cmd.requires_followup);
        let ctx = cmd.followup_context.unwrap();
        assert_eq!(ctx.parameter_to_update.as_deref(), Some("to"));
        let draft = ctx.context.get("current_draft").unwrap();
        assert_eq!(draft.get("subject").unwrap(), "Hi");
        assert_eq!(draft.get("body").unwrap(), "Lunch?");
    }

    #[test]
    fn email_broken_followup_context_still_forced() {
        let reply = r#"{"command_type": "email_send", "parameters": {"body": "hi"}, "requires_followup": true, "followup_context": {"question": ""}}"#;
        let cmd = parse_oracle_reply(reply).unwrap();
        assert!(cmd.requires_followup);
        assert_eq!(
            cmd.followup_context.unwrap().parameter_to_update.as_deref(),
            Some("to")
        );
    }

    #[test]
    fn email_missing_subject_defaults() {
        let reply = r#"{"command_type": "email_draft", "parameters": {}, "requires_followup": false}"#;
        let cmd = parse_oracle_reply(reply).unwrap();
        assert_eq!(cmd.param_str("subject"), Some(DEFAULT_SUBJECT));
        assert_eq!(
            cmd.parameters.get("body").and_then(Value::as_str),
            Some("")
        );
    }

    #[tokio::test]
    async fn classify_builds_window_and_validates() {
        use crate::llm::MockLlmClient;

        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"command_type": "calendar_add", "parameters": {"title": "standup", "date": "tomorrow"}, "requires_followup": false}"#,
        ]));
        let classifier = CommandClassifier::new(llm, 5, 5);
        let cmd = classifier.classify("schedule standup tomorrow", &[]).await.unwrap();
        // 校验器发现 time 缺失，追加追问
        assert!(cmd.requires_followup);
        assert_eq!(
            cmd.followup_context.unwrap().parameter_to_update.as_deref(),
            Some("time")
        );
    }
}
