//! 学习统计模块
//!
//! 记录累计替换词数和当日词数，当日计数在日期翻转时清零。

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::annotation::config::constants;
use crate::annotation::storage::backend::{StorageBackend, StoreWriter};

/// 学习统计数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningStats {
    pub total_words: u64,
    pub today_words: u64,
    pub last_date: String,
}

impl Default for LearningStats {
    fn default() -> Self {
        Self {
            total_words: 0,
            today_words: 0,
            last_date: String::new(),
        }
    }
}

/// 统计存储
///
/// 管道在每个成功的替换批次后上报词数；持久化即发即忘。
pub struct StatsStore {
    inner: Mutex<LearningStats>,
    writer: Option<StoreWriter>,
}

impl StatsStore {
    /// 创建统计存储
    pub fn new(initial: LearningStats, writer: Option<StoreWriter>) -> Self {
        Self {
            inner: Mutex::new(initial),
            writer,
        }
    }

    /// 从持久化后端加载统计，失败时按零值处理
    pub fn load(backend: &dyn StorageBackend, writer: Option<StoreWriter>) -> Self {
        let initial = match backend.load(constants::STORAGE_KEY_STATS) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::debug!("统计数据反序列化失败，重置为零: {}", e);
                LearningStats::default()
            }),
            Ok(None) => LearningStats::default(),
            Err(e) => {
                tracing::debug!("统计数据加载失败，重置为零: {}", e);
                LearningStats::default()
            }
        };
        Self::new(initial, writer)
    }

    /// 上报一批成功替换的词数
    pub fn record_words(&self, count: u64) {
        self.record_words_on(count, &today_string());
    }

    /// 当前统计的快照（读取时同样应用日期翻转）
    pub fn snapshot(&self) -> LearningStats {
        let mut stats = self.lock_inner();
        roll_over(&mut stats, &today_string());
        stats.clone()
    }

    fn record_words_on(&self, count: u64, today: &str) {
        let snapshot = {
            let mut stats = self.lock_inner();
            roll_over(&mut stats, today);
            stats.total_words += count;
            stats.today_words += count;
            stats.clone()
        };
        self.persist(&snapshot);
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, LearningStats> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, stats: &LearningStats) {
        if let Some(writer) = &self.writer {
            match serde_json::to_value(stats) {
                Ok(value) => writer.write(constants::STORAGE_KEY_STATS, value),
                Err(e) => tracing::debug!("统计序列化失败，跳过持久化: {}", e),
            }
        }
    }
}

/// 当日词数在日期变化时清零
fn roll_over(stats: &mut LearningStats, today: &str) {
    if stats.last_date != today {
        stats.today_words = 0;
        stats.last_date = today.to_string();
    }
}

fn today_string() -> String {
    chrono::Local::now().date_naive().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_words_accumulates() {
        let store = StatsStore::new(LearningStats::default(), None);
        store.record_words(3);
        store.record_words(2);

        let stats = store.snapshot();
        assert_eq!(stats.total_words, 5);
        assert_eq!(stats.today_words, 5);
    }

    #[test]
    fn test_day_rollover_resets_today_count() {
        let store = StatsStore::new(
            LearningStats {
                total_words: 10,
                today_words: 10,
                last_date: "2020-01-01".to_string(),
            },
            None,
        );
        store.record_words_on(1, "2020-01-02");

        let stats = store.lock_inner().clone();
        assert_eq!(stats.total_words, 11);
        assert_eq!(stats.today_words, 1);
        assert_eq!(stats.last_date, "2020-01-02");
    }
}
