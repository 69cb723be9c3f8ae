//! 变更观察器
//!
//! 观察页面结构变化并触发重新扫描。快速连续的变更合并为一次：
//! 已有待处理的重扫时，新到的变更通知被吸收，不会排第二次。
//! 观察器可停止（功能停用时）并可重新启动。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// 变更通知句柄
///
/// 页面内容新增时调用 `notify()`。可克隆，跨任务使用。
#[derive(Clone)]
pub struct MutationNotifier {
    tx: mpsc::UnboundedSender<()>,
    shared: Arc<WatcherShared>,
}

struct WatcherShared {
    /// 已调度且尚未完成的重扫
    pending: AtomicBool,
    /// 观察是否开启
    active: AtomicBool,
}

impl MutationNotifier {
    /// 上报一批结构变化
    ///
    /// 观察停止时为空操作；已有待处理重扫时被吸收。
    pub fn notify(&self) {
        if !self.shared.active.load(Ordering::SeqCst) {
            return;
        }
        if self.shared.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.tx.send(()).is_err() {
            self.shared.pending.store(false, Ordering::SeqCst);
        }
    }
}

/// 变更观察器
pub struct MutationWatcher {
    rx: mpsc::UnboundedReceiver<()>,
    shared: Arc<WatcherShared>,
}

impl MutationWatcher {
    /// 创建观察器和配套的通知句柄，初始为开启状态
    pub fn new() -> (Self, MutationNotifier) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WatcherShared {
            pending: AtomicBool::new(false),
            active: AtomicBool::new(true),
        });
        (
            Self {
                rx,
                shared: Arc::clone(&shared),
            },
            MutationNotifier { tx, shared },
        )
    }

    /// 恢复观察
    pub fn start(&self) {
        self.shared.active.store(true, Ordering::SeqCst);
    }

    /// 停止观察：后续通知被忽略，直到再次 `start`
    pub fn stop(&self) {
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.pending.store(false, Ordering::SeqCst);
    }

    /// 观察是否开启
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// 等待下一次重扫触发
    ///
    /// 所有通知句柄都被释放后返回 `None`。
    pub async fn next_trigger(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// 立即取走一个已排队的触发（测试与非阻塞轮询用）
    pub fn try_trigger(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// 重扫完成后调用，允许调度下一次重扫
    pub fn rescan_complete(&self) {
        self.shared.pending.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rapid_notices_coalesce() {
        let (mut watcher, notifier) = MutationWatcher::new();

        notifier.notify();
        notifier.notify();
        notifier.notify();

        // 三次通知只排了一次重扫
        assert!(watcher.try_trigger());
        assert!(!watcher.try_trigger());
    }

    #[tokio::test]
    async fn test_rescan_complete_allows_next_schedule() {
        let (mut watcher, notifier) = MutationWatcher::new();

        notifier.notify();
        assert!(watcher.try_trigger());
        // 重扫未完成前的新通知被吸收
        notifier.notify();
        assert!(!watcher.try_trigger());

        watcher.rescan_complete();
        notifier.notify();
        assert!(watcher.try_trigger());
    }

    #[tokio::test]
    async fn test_stopped_watcher_ignores_notices() {
        let (mut watcher, notifier) = MutationWatcher::new();

        watcher.stop();
        notifier.notify();
        assert!(!watcher.try_trigger());

        // 重新启动后恢复工作
        watcher.start();
        notifier.notify();
        assert!(watcher.try_trigger());
    }

    #[tokio::test]
    async fn test_channel_closes_when_notifiers_dropped() {
        let (mut watcher, notifier) = MutationWatcher::new();
        drop(notifier);
        assert_eq!(watcher.next_trigger().await, None);
    }
}
