//! 响应格式化
//!
//! 确定性模板为主：按 command_type 把原始执行结果转为适合朗读的一句话。
//! 空结果集必须给出明确的「没找到」语句；raw 中带 error 键时原样短路返回。
//! 可选叠加 LLM 摘要（with_llm），失败回落到模板。

use std::sync::Arc;

use serde_json::Value;

use crate::command::CommandType;
use crate::llm::{LlmClient, Message};

const SUMMARIZE_PROMPT: &str = "You are a helpful voice assistant. Convert the raw command output into one concise, natural, speakable sentence. Focus only on the most relevant information and avoid technical details.";

/// 响应格式化器：模板为默认路径，LLM 摘要为可选增强
#[derive(Default)]
pub struct Formatter {
    llm: Option<Arc<dyn LlmClient>>,
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启用 LLM 摘要（仅用于模板之外的长输出；失败回落模板）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 格式化原始结果；error 键短路，空集合给「没找到」语句，绝不返回空串
    pub async fn format(&self, command_type: CommandType, raw: &Value) -> String {
        if let Some(err) = raw.get("error").and_then(Value::as_str) {
            return err.to_string();
        }

        let templated = render_template(command_type, raw);
        if let (Some(llm), None) = (&self.llm, templated.as_deref()) {
            if let Some(summary) = self.summarize(llm.as_ref(), command_type, raw).await {
                return summary;
            }
        }

        templated.unwrap_or_else(|| "I've processed your request.".to_string())
    }

    async fn summarize(
        &self,
        llm: &dyn LlmClient,
        command_type: CommandType,
        raw: &Value,
    ) -> Option<String> {
        let messages = [
            Message::system(SUMMARIZE_PROMPT),
            Message::user(format!("Command: {}. Raw output: {}", command_type, raw)),
        ];
        match llm.complete(&messages).await {
            Ok(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed, falling back to template");
                None
            }
        }
    }
}

/// 模板渲染；None 表示该形状没有专用模板（交给 LLM 或通用句）
fn render_template(command_type: CommandType, raw: &Value) -> Option<String> {
    match command_type {
        CommandType::CalendarCheck => {
            let events = raw.get("events")?.as_array()?;
            if events.is_empty() {
                return Some("You have no events scheduled in that time period.".to_string());
            }
            let lines: Vec<String> = events
                .iter()
                .map(|e| {
                    let summary = e.get("summary").and_then(Value::as_str).unwrap_or("Untitled");
                    let start = e.get("start").and_then(Value::as_str).unwrap_or("an unknown time");
                    let location = e.get("location").and_then(Value::as_str).unwrap_or("");
                    if location.is_empty() || location == "No Location" {
                        format!("{} at {}", summary, start)
                    } else {
                        format!("{} at {} in {}", summary, start, location)
                    }
                })
                .collect();
            Some(format!(
                "You have {} event{}: {}.",
                events.len(),
                if events.len() == 1 { "" } else { "s" },
                lines.join("; ")
            ))
        }
        CommandType::CalendarAdd => {
            let event = raw.get("event")?;
            let summary = event.get("summary").and_then(Value::as_str).unwrap_or("your event");
            let start = event.get("start").and_then(Value::as_str).unwrap_or("the requested time");
            Some(format!("I've scheduled {} for {}.", summary, start))
        }
        CommandType::EmailCheck => {
            let emails = raw.get("emails")?.as_array()?;
            if emails.is_empty() {
                return Some("You have no recent emails.".to_string());
            }
            let lines: Vec<String> = emails
                .iter()
                .map(|m| {
                    let subject = m.get("subject").and_then(Value::as_str).unwrap_or("(No Subject)");
                    let sender = m.get("sender").and_then(Value::as_str).unwrap_or("Unknown");
                    format!("{} from {}", subject, sender)
                })
                .collect();
            Some(format!(
                "You have {} recent email{}: {}.",
                emails.len(),
                if emails.len() == 1 { "" } else { "s" },
                lines.join("; ")
            ))
        }
        CommandType::EmailSend => {
            let sent = raw.get("sent")?;
            let subject = sent.get("subject").and_then(Value::as_str).unwrap_or("(No Subject)");
            Some(format!("Your email \"{}\" has been sent.", subject))
        }
        CommandType::EmailDraft => {
            let draft = raw.get("draft")?;
            let subject = draft.get("subject").and_then(Value::as_str).unwrap_or("(No Subject)");
            Some(format!("I've saved a draft of \"{}\".", subject))
        }
        CommandType::FileSearch => {
            let term = raw.get("search_term").and_then(Value::as_str).unwrap_or("that");
            let results = raw.get("results")?.as_array()?;
            if results.is_empty() {
                return Some(format!("I couldn't find any files matching \"{}\".", term));
            }
            let names: Vec<&str> = results
                .iter()
                .filter_map(|r| r.get("name").and_then(Value::as_str))
                .collect();
            Some(format!(
                "I found {} file{} matching \"{}\": {}.",
                results.len(),
                if results.len() == 1 { "" } else { "s" },
                term,
                names.join(", ")
            ))
        }
        CommandType::StoreSearch => {
            let query = raw.get("query").and_then(Value::as_str).unwrap_or("that");
            let results = raw.get("results")?.as_array()?;
            if results.is_empty() {
                return Some(format!(
                    "I couldn't find anything about \"{}\" in our past conversations.",
                    query
                ));
            }
            let lines: Vec<&str> = results
                .iter()
                .filter_map(|r| r.get("query").and_then(Value::as_str))
                .collect();
            Some(format!(
                "I found {} related conversation{}: {}.",
                results.len(),
                if results.len() == 1 { "" } else { "s" },
                lines.join("; ")
            ))
        }
        CommandType::AppLaunch => {
            let app = raw.get("launched").and_then(Value::as_str)?;
            Some(format!("Opening {}.", app))
        }
        CommandType::GeneralQuestion => raw
            .get("response")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn empty_file_search_mentions_term_and_is_not_empty() {
        let f = Formatter::new();
        let out = f
            .format(
                CommandType::FileSearch,
                &json!({"search_term": "resume", "results": []}),
            )
            .await;
        assert!(out.contains("resume"));
        assert!(out.to_lowercase().contains("find"));
        assert!(!out.is_empty());
    }

    #[tokio::test]
    async fn error_key_short_circuits_verbatim() {
        let f = Formatter::new();
        let out = f
            .format(CommandType::CalendarCheck, &json!({"error": "calendar unavailable"}))
            .await;
        assert_eq!(out, "calendar unavailable");
    }

    #[tokio::test]
    async fn calendar_events_rendered() {
        let f = Formatter::new();
        let out = f
            .format(
                CommandType::CalendarCheck,
                &json!({"events": [
                    {"summary": "Team Meeting", "start": "2024-03-20T14:00:00-04:00", "location": "Room A"}
                ]}),
            )
            .await;
        assert!(out.contains("Team Meeting"));
        assert!(out.contains("Room A"));
    }

    #[tokio::test]
    async fn empty_calendar_is_explicit() {
        let f = Formatter::new();
        let out = f
            .format(CommandType::CalendarCheck, &json!({"events": []}))
            .await;
        assert!(out.contains("no events"));
    }

    #[tokio::test]
    async fn unknown_shape_still_speaks() {
        let f = Formatter::new();
        let out = f.format(CommandType::CalendarCheck, &json!({})).await;
        assert!(!out.is_empty());
    }
}
