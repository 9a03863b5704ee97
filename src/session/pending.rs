//! 待定命令存储
//!
//! 显式键值存储（user_id -> 至多一条待定命令），替代源设计里的模块级
//! 全局字典。每个键一把异步互斥锁：同一用户的「查待定 → 合并 → 清除/更新」
//! 读改写在锁内完成，并发到达的同用户轮次被串行化。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::command::Command;

/// 一条待定命令及其已经历的追问轮数
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub command: Command,
    /// 已消费的追问轮数（自循环计数，超过上限强制清除）
    pub depth: u8,
}

impl PendingEntry {
    pub fn new(command: Command) -> Self {
        Self { command, depth: 0 }
    }
}

type Slot = Arc<Mutex<Option<PendingEntry>>>;

/// 待定命令存储：user_id -> 单槽位
#[derive(Default)]
pub struct PendingStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取该用户槽位的独占守卫；读改写全程持有，保证同用户轮次串行
    pub async fn guard(&self, user_id: &str) -> OwnedMutexGuard<Option<PendingEntry>> {
        let slot = {
            let mut slots = self.slots.write().await;
            slots.entry(user_id.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// 写入待定命令（追问刚产生时；深度清零）
    pub async fn put(&self, user_id: &str, command: Command) {
        let mut guard = self.guard(user_id).await;
        *guard = Some(PendingEntry::new(command));
    }

    /// 清除该用户的待定命令（错误路径必须调用）
    pub async fn clear(&self, user_id: &str) {
        let mut guard = self.guard(user_id).await;
        *guard = None;
    }

    /// 是否存在待定命令（只读探测）
    pub async fn has_pending(&self, user_id: &str) -> bool {
        let slot = {
            let slots = self.slots.read().await;
            slots.get(user_id).cloned()
        };
        match slot {
            Some(s) => s.lock().await.is_some(),
            None => false,
        }
    }
}
