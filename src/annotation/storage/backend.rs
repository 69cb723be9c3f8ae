//! 键值存储后端
//!
//! 所有持久状态（设置、统计、两个缓存命名空间）都以不透明JSON块的
//! 形式存放在同一个外部存储中。写入统一经过后台写队列：
//! 写失败被记录并丢弃，绝不影响调用方的读写路径。

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::annotation::error::{AnnotationError, AnnotationResult};

const TABLE: TableDefinition<&str, &str> = TableDefinition::new("lexiweave");

/// 不透明键值存储后端
pub trait StorageBackend: Send + Sync {
    /// 读取指定键下的JSON块，键不存在时返回 `None`
    fn load(&self, key: &str) -> AnnotationResult<Option<Value>>;

    /// 写入指定键下的JSON块
    fn store(&self, key: &str, value: &Value) -> AnnotationResult<()>;
}

/// 内存后端（测试与无持久化运行）
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟持久化失败：之后的所有写入都会报错
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, key: &str) -> AnnotationResult<Option<Value>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, value: &Value) -> AnnotationResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AnnotationError::StorageError("模拟写入失败".to_string()));
        }
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// redb 磁盘后端
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// 打开（或创建）磁盘数据库
    pub fn open<P: AsRef<Path>>(path: P) -> AnnotationResult<Self> {
        let db = Database::create(path)
            .map_err(|e| AnnotationError::StorageError(format!("打开存储失败: {}", e)))?;
        Ok(Self { db })
    }
}

impl StorageBackend for RedbBackend {
    fn load(&self, key: &str) -> AnnotationResult<Option<Value>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| AnnotationError::StorageError(format!("读事务失败: {}", e)))?;
        let table = match txn.open_table(TABLE) {
            Ok(table) => table,
            // 首次运行时表尚不存在
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => {
                return Err(AnnotationError::StorageError(format!("打开表失败: {}", e)));
            }
        };
        let guard = table
            .get(key)
            .map_err(|e| AnnotationError::StorageError(format!("读取失败: {}", e)))?;
        match guard {
            Some(raw) => {
                let value = serde_json::from_str(raw.value())
                    .map_err(|e| AnnotationError::StorageError(format!("存储块损坏: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, value: &Value) -> AnnotationResult<()> {
        let serialized = serde_json::to_string(value)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| AnnotationError::StorageError(format!("写事务失败: {}", e)))?;
        {
            let mut table = txn
                .open_table(TABLE)
                .map_err(|e| AnnotationError::StorageError(format!("打开表失败: {}", e)))?;
            table
                .insert(key, serialized.as_str())
                .map_err(|e| AnnotationError::StorageError(format!("写入失败: {}", e)))?;
        }
        txn.commit()
            .map_err(|e| AnnotationError::StorageError(format!("提交失败: {}", e)))?;
        Ok(())
    }
}

enum WriteOp {
    Put(String, Value),
    Flush(oneshot::Sender<()>),
}

/// 写队列的发送端
///
/// 写入是即发即忘的：排队失败或后端写失败都只记录日志。
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl StoreWriter {
    /// 异步写入一个键值对，不阻塞也不报错
    pub fn write(&self, key: &str, value: Value) {
        if self.tx.send(WriteOp::Put(key.to_string(), value)).is_err() {
            tracing::debug!("写队列已关闭，丢弃对 {} 的写入", key);
        }
    }
}

/// 后台写队列
///
/// 按顺序排空写入请求；单个写失败不会中断队列。
pub struct WriteQueue {
    writer: StoreWriter,
    handle: tokio::task::JoinHandle<()>,
}

impl WriteQueue {
    /// 启动写队列任务
    pub fn spawn(backend: Arc<dyn StorageBackend>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    WriteOp::Put(key, value) => {
                        if let Err(e) = backend.store(&key, &value) {
                            tracing::debug!("持久化 {} 失败（忽略）: {}", key, e);
                        }
                    }
                    WriteOp::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        Self {
            writer: StoreWriter { tx },
            handle,
        }
    }

    /// 获取可克隆的写入端
    pub fn writer(&self) -> StoreWriter {
        self.writer.clone()
    }

    /// 等待队列中已提交的写入全部落盘
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.writer.tx.send(WriteOp::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// 关闭队列并等待任务退出
    pub async fn shutdown(self) {
        self.flush().await;
        drop(self.writer);
        let _ = self.handle.await;
    }
}
