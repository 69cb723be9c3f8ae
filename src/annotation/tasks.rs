//! 元素任务注册表
//!
//! 将元素处理状态从DOM属性标记重构为显式的任务注册表：
//! 状态迁移 `pending → processing → done` 可独立于活动DOM检查和测试。
//! DOM属性仅作为扫描器跳过已处理元素的标记冗余保留。
//!
//! `try_claim` 的检查加标记在一次锁内完成：初始管道和变更触发的
//! 管道都把"已标记"视为排他声明，同一元素不会被两次入队。

use std::collections::HashMap;
use std::sync::Mutex;

/// 元素任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Processing,
    Done,
}

/// 任务注册表
#[derive(Default)]
pub struct TaskRegistry {
    states: Mutex<HashMap<u64, TaskState>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试声明一个元素
    ///
    /// 仅当元素未注册或处于 `Pending` 时成功，成功后状态变为
    /// `Processing`。检查与标记在同一次锁内完成。
    pub fn try_claim(&self, id: u64) -> bool {
        let mut states = self.lock_states();
        match states.get(&id) {
            None | Some(TaskState::Pending) => {
                states.insert(id, TaskState::Processing);
                true
            }
            Some(_) => false,
        }
    }

    /// 标记元素处理完成（无论成功或内部出错）
    pub fn mark_done(&self, id: u64) {
        let mut states = self.lock_states();
        states.insert(id, TaskState::Done);
    }

    /// 查询元素状态
    pub fn state(&self, id: u64) -> Option<TaskState> {
        self.lock_states().get(&id).copied()
    }

    /// 当前处于 `Processing` 状态的任务数
    pub fn processing_count(&self) -> usize {
        self.lock_states()
            .values()
            .filter(|s| **s == TaskState::Processing)
            .count()
    }

    /// 是否所有已注册任务都已完成
    pub fn all_done(&self) -> bool {
        self.lock_states().values().all(|s| *s == TaskState::Done)
    }

    /// 已注册任务总数
    pub fn len(&self) -> usize {
        self.lock_states().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_states().is_empty()
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, HashMap<u64, TaskState>> {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let registry = TaskRegistry::new();
        assert!(registry.try_claim(1));
        // 第二次声明失败：已被占用
        assert!(!registry.try_claim(1));
        assert_eq!(registry.state(1), Some(TaskState::Processing));
    }

    #[test]
    fn test_done_elements_cannot_be_reclaimed() {
        let registry = TaskRegistry::new();
        assert!(registry.try_claim(7));
        registry.mark_done(7);
        assert!(!registry.try_claim(7));
        assert_eq!(registry.state(7), Some(TaskState::Done));
    }

    #[test]
    fn test_processing_count() {
        let registry = TaskRegistry::new();
        registry.try_claim(1);
        registry.try_claim(2);
        registry.mark_done(1);
        assert_eq!(registry.processing_count(), 1);
        assert!(!registry.all_done());
        registry.mark_done(2);
        assert!(registry.all_done());
    }
}
