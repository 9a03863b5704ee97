//! 命令校验与归一化
//!
//! 纯函数：按 command_type 检查参数键，补默认值，计算是否需要追问。
//! 幂等：validate(validate(cmd)) == validate(cmd)。

use serde_json::Value;

use crate::command::{Command, CommandType, FollowupContext};
use crate::error::AssistantError;

/// 邮件缺省主题
pub const DEFAULT_SUBJECT: &str = "No Subject";

/// 校验并归一化命令（默认值、追问不变量）
///
/// 返回 Validation 错误仅用于 schema 缺口（已知类型但缺必需参数且无追问路径）；
/// 正常的参数缺失通过 requires_followup 表达。
pub fn validate(mut cmd: Command) -> Result<Command, AssistantError> {
    match cmd.command_type {
        CommandType::CalendarCheck => {
            // date > start/end 区间 > timeframe > 默认未来 24h；此处只做互斥归一，
            // 具体解析在 Executor 的时间段分派里
            if cmd.param_str("date").is_some() {
                cmd.parameters.remove("timeframe");
            } else if cmd.param_str("start_date").is_some() && cmd.param_str("end_date").is_some() {
                cmd.parameters.remove("timeframe");
            }
            cmd.clear_followup();
        }
        CommandType::CalendarAdd => {
            // title/date/time 三者缺一则追问；按固定顺序问第一个缺失项
            let missing = ["title", "date", "time"]
                .iter()
                .find(|k| cmd.param_str(k).is_none())
                .copied();
            match missing {
                Some("title") => {
                    cmd.requires_followup = true;
                    cmd.followup_context = Some(FollowupContext::ask(
                        "What should I call this event?",
                        "title",
                    ));
                }
                Some("date") => {
                    cmd.requires_followup = true;
                    cmd.followup_context = Some(FollowupContext::ask(
                        "What day should I schedule it for?",
                        "date",
                    ));
                }
                Some("time") => {
                    cmd.requires_followup = true;
                    cmd.followup_context = Some(FollowupContext::ask(
                        "What time should the event start?",
                        "time",
                    ));
                }
                _ => cmd.clear_followup(),
            }
        }
        CommandType::EmailCheck => {
            if cmd.param_str("max_results").is_none() {
                cmd.set_param("max_results", 5);
            }
            cmd.clear_followup();
        }
        CommandType::EmailSend | CommandType::EmailDraft => {
            // 主题/正文缺失用默认值，不是校验错误
            if cmd.param_str("subject").is_none() {
                cmd.set_param("subject", DEFAULT_SUBJECT);
            }
            if cmd.parameters.get("body").and_then(Value::as_str).is_none() {
                cmd.set_param("body", "");
            }
            // 收件人缺失或不合法则必须追问（分类器已强制，此处兜底保持幂等）
            if cmd.param_str("to").is_none() {
                let mut ctx = FollowupContext::ask(
                    "Who should I send this email to? Please provide their email address.",
                    "to",
                );
                ctx.context.insert(
                    "current_draft".to_string(),
                    serde_json::json!({
                        "subject": cmd.param_str("subject").unwrap_or(DEFAULT_SUBJECT),
                        "body": cmd.parameters.get("body").cloned().unwrap_or(Value::String(String::new())),
                    }),
                );
                cmd.requires_followup = true;
                cmd.followup_context = Some(ctx);
            } else {
                cmd.clear_followup();
            }
        }
        CommandType::FileSearch => {
            // filename 缺失本身就是合法的追问触发，不补默认值
            if cmd.param_str("filename").is_none() {
                cmd.requires_followup = true;
                cmd.followup_context = Some(FollowupContext::ask(
                    "What file name should I look for?",
                    "filename",
                ));
            } else {
                cmd.clear_followup();
            }
        }
        CommandType::StoreSearch => {
            if cmd.param_str("query").is_none() {
                cmd.requires_followup = true;
                cmd.followup_context = Some(FollowupContext::ask(
                    "What would you like me to look up in our past conversations?",
                    "query",
                ));
            } else {
                cmd.clear_followup();
            }
        }
        CommandType::AppLaunch => {
            if cmd.param_str("app_name").is_none() {
                cmd.requires_followup = true;
                cmd.followup_context = Some(FollowupContext::ask(
                    "Which application should I open?",
                    "app_name",
                ));
            } else {
                cmd.clear_followup();
            }
        }
        CommandType::GeneralQuestion => {
            // 答案已在分类阶段提升到 response；缺失视为 schema 缺口
            if cmd.response.is_none() && cmd.param_str("response").is_none() {
                return Err(AssistantError::Validation(
                    "general_question without an answer".to_string(),
                ));
            }
            cmd.clear_followup();
        }
    }

    debug_assert!(cmd.followup_invariant_holds());
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(t: CommandType) -> Command {
        Command::new(t)
    }

    #[test]
    fn idempotent() {
        let cases = vec![
            cmd(CommandType::CalendarCheck),
            {
                let mut c = cmd(CommandType::CalendarAdd);
                c.set_param("title", "standup");
                c
            },
            cmd(CommandType::EmailSend),
            cmd(CommandType::FileSearch),
            {
                let mut c = cmd(CommandType::AppLaunch);
                c.set_param("app_name", "notes");
                c
            },
        ];
        for c in cases {
            let once = validate(c).unwrap();
            let twice = validate(once.clone()).unwrap();
            assert_eq!(
                serde_json::to_value(&once).unwrap(),
                serde_json::to_value(&twice).unwrap()
            );
        }
    }

    #[test]
    fn calendar_add_asks_for_first_missing() {
        let mut c = cmd(CommandType::CalendarAdd);
        c.set_param("title", "dentist");
        c.set_param("date", "tomorrow");
        let v = validate(c).unwrap();
        assert!(v.requires_followup);
        assert_eq!(
            v.followup_context.unwrap().parameter_to_update.as_deref(),
            Some("time")
        );
    }

    #[test]
    fn email_defaults_filled() {
        let mut c = cmd(CommandType::EmailDraft);
        c.set_param("body", "see you there");
        let v = validate(c).unwrap();
        assert_eq!(v.param_str("subject"), Some(DEFAULT_SUBJECT));
        assert!(v.requires_followup);
        let ctx = v.followup_context.unwrap();
        assert_eq!(ctx.parameter_to_update.as_deref(), Some("to"));
        assert!(ctx.context.contains_key("current_draft"));
    }

    #[test]
    fn email_with_recipient_needs_no_followup() {
        let mut c = cmd(CommandType::EmailSend);
        c.set_param("to", "ada@example.com");
        let v = validate(c).unwrap();
        assert!(!v.requires_followup);
        assert!(v.followup_context.is_none());
    }

    #[test]
    fn file_search_missing_filename_is_followup_not_default() {
        let v = validate(cmd(CommandType::FileSearch)).unwrap();
        assert!(v.requires_followup);
        assert!(v.param_str("filename").is_none());
        assert_eq!(
            v.followup_context.unwrap().parameter_to_update.as_deref(),
            Some("filename")
        );
    }

    #[test]
    fn date_beats_timeframe() {
        let mut c = cmd(CommandType::CalendarCheck);
        c.set_param("date", "2024-03-22");
        c.set_param("timeframe", "next_week");
        let v = validate(c).unwrap();
        assert!(v.param_str("timeframe").is_none());
        assert_eq!(v.param_str("date"), Some("2024-03-22"));
    }

    #[test]
    fn general_question_without_answer_is_schema_gap() {
        assert!(validate(cmd(CommandType::GeneralQuestion)).is_err());
    }
}
