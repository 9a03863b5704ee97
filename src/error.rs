//! 助理错误类型
//!
//! 传播策略：Oracle / Tool 层失败在各自组件边界转为结构化错误负载，
//! 不向上抛未捕获异常；所有触及待定会话状态的错误路径必须清除该状态。

use thiserror::Error;

/// 管线各环节可能出现的错误（分类、校验、执行、会话、传输）
#[derive(Error, Debug)]
pub enum AssistantError {
    /// 分类结果无法解析或命令类型不在封闭集内
    #[error("Oracle failure: {0}")]
    Oracle(String),

    /// 已知命令类型但缺少必需参数且无追问路径（schema 缺口，需上报）
    #[error("Validation failure: {0}")]
    Validation(String),

    /// 下游工具能力错误（在 Executor 边界转 {"error": ...}，不再上抛）
    #[error("Tool failure: {0}")]
    Tool(String),

    /// 追问时找不到待定命令，或会话已过期
    #[error("Session failure: {0}")]
    Session(String),

    /// 入站消息形状不合法（按消息上报，连接保持）
    #[error("Transport failure: {0}")]
    Transport(String),

    /// 外部调用超时（oracle / 工具 / 存储），可恢复
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AssistantError {
    /// 用户可见的降级话术：任何失败路径都必须产生可播报的文本，绝不静默
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::Oracle(_) => {
                "I apologize, but I could not process that command.".to_string()
            }
            AssistantError::Validation(msg) => {
                format!("I apologize, but the command is missing something I need: {}", msg)
            }
            AssistantError::Tool(msg) => {
                format!("I apologize, but something went wrong while doing that: {}", msg)
            }
            AssistantError::Session(_) => {
                "No active session found. Please start over with your request.".to_string()
            }
            AssistantError::Transport(_) => {
                "I apologize, but I could not understand that message.".to_string()
            }
            AssistantError::Timeout(_) => {
                "I apologize, but that took too long. Please try again.".to_string()
            }
            AssistantError::Config(msg) => {
                format!("I apologize, but the assistant is misconfigured: {}", msg)
            }
        }
    }
}
