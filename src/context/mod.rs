//! 会话历史存储
//!
//! 追加式的会话轮记录 + 按用户/会话检索；相似度查询接口窄化为
//! search(user, query, k)，允许刚写入的记录查不到（最终一致）。

pub mod store;
pub mod turn;

pub use store::{ContextStore, InMemoryContextStore};
pub use turn::{ChatSession, ConversationTurn};
