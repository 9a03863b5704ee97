//! 追问会话层
//!
//! PendingStore 保存每个用户至多一条待定命令（带追问深度）；
//! FollowupHandler 消费后续话语，合并缺失参数并重新驱动执行。

pub mod followup;
pub mod pending;

pub use followup::{FollowupHandler, MAX_FOLLOWUP_DEPTH};
pub use pending::{PendingEntry, PendingStore};
