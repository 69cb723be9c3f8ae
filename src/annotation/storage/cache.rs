//! 两级缓存存储
//!
//! 句子级缓存（带24小时过期）和词条详情缓存（仅容量上限）共用同一套
//! 实现：条目带创建/最近访问时间戳，容量超限时按最久未访问优先淘汰。
//! 持久化写入即发即忘，读路径不等待落盘。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::config::constants;
use crate::annotation::storage::backend::{StorageBackend, StoreWriter};

/// 缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub created_at: u64,
    pub last_accessed_at: u64,
}

/// 缓存命名空间
///
/// 每个命名空间有独立的过期策略和存储键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// 句子级翻译结果，按 `方向 + 文本哈希` 键控，24小时过期
    Sentence,
    /// 词条详情，按 `词 + 释义 + 语言对` 键控，永不过期
    WordDetail,
}

impl CacheNamespace {
    fn storage_key(&self) -> &'static str {
        match self {
            CacheNamespace::Sentence => constants::STORAGE_KEY_SENTENCE_CACHE,
            CacheNamespace::WordDetail => constants::STORAGE_KEY_WORD_DETAIL_CACHE,
        }
    }

    fn ttl(&self, sentence_ttl: Duration) -> Option<Duration> {
        match self {
            CacheNamespace::Sentence => Some(sentence_ttl),
            CacheNamespace::WordDetail => None,
        }
    }
}

/// 生成句子缓存键：方向 + 截断文本的内容哈希
pub fn sentence_cache_key(direction: &str, text: &str) -> String {
    let hash = blake3::hash(format!("{}_{}", direction, text).as_bytes());
    hash.to_hex().to_string()
}

/// 生成词条详情缓存键
pub fn word_detail_cache_key(word: &str, gloss: &str, native: &str, target: &str) -> String {
    format!("{}_{}_{}_{}", word, gloss, native, target)
}

/// 缓存存储
pub struct CacheStore {
    maps: Mutex<CacheMaps>,
    capacity: usize,
    sentence_ttl: Duration,
    writer: Option<StoreWriter>,
}

struct CacheMaps {
    sentence: HashMap<String, CacheEntry>,
    word_detail: HashMap<String, CacheEntry>,
    // 单调时钟：同一存储内时间戳严格递增，保证淘汰顺序确定
    last_timestamp: u64,
}

impl CacheMaps {
    fn namespace_mut(&mut self, ns: CacheNamespace) -> &mut HashMap<String, CacheEntry> {
        match ns {
            CacheNamespace::Sentence => &mut self.sentence,
            CacheNamespace::WordDetail => &mut self.word_detail,
        }
    }

    fn next_timestamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }
}

impl CacheStore {
    /// 使用默认容量和过期窗口创建空缓存
    pub fn new(writer: Option<StoreWriter>) -> Self {
        Self::with_limits(
            constants::MAX_CACHE_ENTRIES,
            constants::SENTENCE_CACHE_TTL,
            writer,
        )
    }

    /// 使用指定容量和过期窗口创建空缓存
    pub fn with_limits(capacity: usize, sentence_ttl: Duration, writer: Option<StoreWriter>) -> Self {
        Self {
            maps: Mutex::new(CacheMaps {
                sentence: HashMap::new(),
                word_detail: HashMap::new(),
                last_timestamp: 0,
            }),
            capacity,
            sentence_ttl,
            writer,
        }
    }

    /// 从持久化后端加载缓存内容
    ///
    /// 读取失败按空缓存处理，不向调用方传播。
    pub fn load(backend: &dyn StorageBackend, writer: Option<StoreWriter>) -> Self {
        let store = Self::new(writer);
        {
            let mut maps = store.lock_maps();
            maps.sentence = Self::load_namespace(backend, CacheNamespace::Sentence);
            maps.word_detail = Self::load_namespace(backend, CacheNamespace::WordDetail);
            let restored_max = maps
                .sentence
                .values()
                .chain(maps.word_detail.values())
                .map(|e| e.last_accessed_at.max(e.created_at))
                .max()
                .unwrap_or(0);
            maps.last_timestamp = restored_max;
        }
        store
    }

    fn load_namespace(backend: &dyn StorageBackend, ns: CacheNamespace) -> HashMap<String, CacheEntry> {
        match backend.load(ns.storage_key()) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::debug!("缓存块反序列化失败，按空缓存处理: {}", e);
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::debug!("缓存加载失败，按空缓存处理: {}", e);
                HashMap::new()
            }
        }
    }

    /// 读取缓存条目
    ///
    /// 命中时异步刷新最近访问时间（不阻塞读取）；过期条目视为不存在。
    pub fn get(&self, ns: CacheNamespace, key: &str) -> Option<Value> {
        let mut maps = self.lock_maps();
        let ttl = ns.ttl(self.sentence_ttl);
        let now = maps.next_timestamp();

        let entry = maps.namespace_mut(ns).get_mut(key)?;
        if let Some(ttl) = ttl {
            if now.saturating_sub(entry.created_at) >= ttl.as_millis() as u64 {
                return None;
            }
        }
        entry.last_accessed_at = now;
        let data = entry.data.clone();
        self.persist(ns, &maps);
        Some(data)
    }

    /// 写入缓存条目
    ///
    /// 先清理过期条目，容量超限时按最久未访问淘汰出一个空位。
    pub fn put(&self, ns: CacheNamespace, key: &str, value: Value) {
        let mut maps = self.lock_maps();
        let ttl = ns.ttl(self.sentence_ttl);
        let now = maps.next_timestamp();
        let capacity = self.capacity;

        let entries = maps.namespace_mut(ns);
        if let Some(ttl) = ttl {
            let ttl_ms = ttl.as_millis() as u64;
            entries.retain(|_, entry| now.saturating_sub(entry.created_at) < ttl_ms);
        }

        if entries.len() >= capacity {
            let evict_count = entries.len() - capacity + 1;
            // 按最近访问时间升序淘汰，平局时先创建的先走
            let mut by_age: Vec<(String, u64, u64)> = entries
                .iter()
                .map(|(k, e)| {
                    let accessed = if e.last_accessed_at > 0 {
                        e.last_accessed_at
                    } else {
                        e.created_at
                    };
                    (k.clone(), accessed, e.created_at)
                })
                .collect();
            by_age.sort_by_key(|(_, accessed, created)| (*accessed, *created));
            for (key, _, _) in by_age.into_iter().take(evict_count) {
                entries.remove(&key);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                created_at: now,
                last_accessed_at: now,
            },
        );
        self.persist(ns, &maps);
    }

    /// 当前命名空间内的条目数
    pub fn len(&self, ns: CacheNamespace) -> usize {
        let mut maps = self.lock_maps();
        maps.namespace_mut(ns).len()
    }

    /// 命名空间是否为空
    pub fn is_empty(&self, ns: CacheNamespace) -> bool {
        self.len(ns) == 0
    }

    /// 是否持有未过期的指定键
    pub fn contains(&self, ns: CacheNamespace, key: &str) -> bool {
        let mut maps = self.lock_maps();
        let ttl = ns.ttl(self.sentence_ttl);
        let now = maps.next_timestamp();
        match maps.namespace_mut(ns).get(key) {
            Some(entry) => match ttl {
                Some(ttl) => now.saturating_sub(entry.created_at) < ttl.as_millis() as u64,
                None => true,
            },
            None => false,
        }
    }

    fn lock_maps(&self) -> std::sync::MutexGuard<'_, CacheMaps> {
        self.maps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, ns: CacheNamespace, maps: &CacheMaps) {
        if let Some(writer) = &self.writer {
            let entries = match ns {
                CacheNamespace::Sentence => &maps.sentence,
                CacheNamespace::WordDetail => &maps.word_detail,
            };
            match serde_json::to_value(entries) {
                Ok(value) => writer.write(ns.storage_key(), value),
                Err(e) => tracing::debug!("缓存序列化失败，跳过持久化: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capacity_eviction_drops_oldest_access() {
        let cache = CacheStore::with_limits(3, Duration::from_secs(3600), None);

        cache.put(CacheNamespace::WordDetail, "a", json!(1));
        cache.put(CacheNamespace::WordDetail, "b", json!(2));
        cache.put(CacheNamespace::WordDetail, "c", json!(3));

        // 访问 a，使其成为最近使用
        assert!(cache.get(CacheNamespace::WordDetail, "a").is_some());

        // 插入第四个，应淘汰最久未访问的 b
        cache.put(CacheNamespace::WordDetail, "d", json!(4));
        assert_eq!(cache.len(CacheNamespace::WordDetail), 3);
        assert!(cache.get(CacheNamespace::WordDetail, "b").is_none());
        assert!(cache.get(CacheNamespace::WordDetail, "a").is_some());
        assert!(cache.get(CacheNamespace::WordDetail, "d").is_some());
    }

    #[test]
    fn test_sentence_expiry_treated_as_absent() {
        let cache = CacheStore::with_limits(100, Duration::from_millis(1), None);

        cache.put(CacheNamespace::Sentence, "k", json!("v"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get(CacheNamespace::Sentence, "k").is_none());
    }

    #[test]
    fn test_word_detail_namespace_never_expires() {
        let cache = CacheStore::with_limits(100, Duration::from_millis(1), None);

        cache.put(CacheNamespace::WordDetail, "k", json!("v"));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(
            cache.get(CacheNamespace::WordDetail, "k"),
            Some(json!("v"))
        );
    }

    #[test]
    fn test_put_purges_expired_before_eviction() {
        let cache = CacheStore::with_limits(2, Duration::from_millis(5), None);

        cache.put(CacheNamespace::Sentence, "old", json!(1));
        std::thread::sleep(Duration::from_millis(10));
        // 过期条目先被清理，因此无需淘汰任何活跃条目
        cache.put(CacheNamespace::Sentence, "fresh", json!(2));
        assert_eq!(cache.len(CacheNamespace::Sentence), 1);
        assert!(cache.contains(CacheNamespace::Sentence, "fresh"));
    }

    #[test]
    fn test_sentence_cache_key_depends_on_direction() {
        let a = sentence_cache_key("native-to-target", "你好世界");
        let b = sentence_cache_key("target-to-native", "你好世界");
        assert_ne!(a, b);
        assert_eq!(a, sentence_cache_key("native-to-target", "你好世界"));
    }
}
