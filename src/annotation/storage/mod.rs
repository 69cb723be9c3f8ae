//! 存储管理模块 - 缓存和持久化存储
//!
//! - `backend`: 不透明键值存储后端与后台写队列
//! - `cache`: 带过期和容量上限的两级缓存存储

pub mod backend;
pub mod cache;

pub use backend::{MemoryBackend, RedbBackend, StorageBackend, StoreWriter, WriteQueue};
pub use cache::{CacheEntry, CacheNamespace, CacheStore};
