//! 命令数据模型与校验
//!
//! Command 是管线的中心值对象：由分类器创建、校验器补默认值、
//! 追问状态机合并参数、执行器只读消费。

pub mod types;
pub mod validate;

pub use types::{Command, CommandType, FollowupContext};
pub use validate::validate;
