//! 最近记录环形缓冲

use std::collections::VecDeque;

use parking_lot::RwLock;

use super::model::Entry;

/// 默认缓冲容量
pub const DEFAULT_CAPACITY: usize = 100;

/// 固定容量的内存缓冲，只保留最新的 N 条记录
///
/// 超出容量时淘汰最旧的记录；淘汰不影响持久化日志
pub struct RecentBuffer {
    entries: RwLock<VecDeque<Entry>>,
    capacity: usize,
}

impl RecentBuffer {
    /// 创建缓冲，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, entry: Entry) {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// 最近一次写入的记录
    pub fn latest(&self) -> Option<Entry> {
        self.entries.read().back().cloned()
    }

    /// 按时间顺序复制当前全部记录
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
