//! Aria - Rust 语音个人助理
//!
//! 模块划分：
//! - **command**: 命令数据模型（封闭类型集）与校验/归一化
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context**: 会话历史存储（按用户/会话检索，相似度接口）
//! - **llm**: LLM 客户端抽象与命令分类器（OpenAI 兼容 / Mock）
//! - **executor**: 命令分发器（按类型路由到工具能力层）
//! - **format**: 响应格式化（模板为主，可选 LLM 摘要）
//! - **session**: 追问状态机与待定命令存储
//! - **pipeline**: 主管线编排（分类 → 校验 → 执行 → 格式化 → 播报）
//! - **tools**: 工具能力层（日历、邮件、文件搜索、应用启动）
//! - **voice**: 语音播报/转写边界（可插拔，失败降级为日志）

pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod format;
pub mod llm;
pub mod observability;
pub mod pipeline;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod tools;
pub mod voice;

pub use command::{Command, CommandType, FollowupContext};
pub use error::AssistantError;
pub use pipeline::Assistant;
