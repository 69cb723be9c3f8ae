//! 错误处理集成测试
//!
//! 结构化错误穿越代理边界、持久化失败的静默降级，
//! 以及自动停用状态的落盘。

use std::sync::Arc;

use lexiweave::annotation::{
    CacheStore, LearningStats, MemoryBackend, ProxyRequest, ProxyResponse, ProxyService,
    SettingsStore, StatsStore, StorageBackend, WriteQueue,
};
use lexiweave::annotation::Direction;

mod common;
use common::{enabled_settings, StubProvider};

#[tokio::test]
async fn test_proxy_returns_structured_error_not_panic() {
    let provider = Arc::new(StubProvider::failing());
    let service = ProxyService::new(
        Arc::new(SettingsStore::new(enabled_settings(), None)),
        Arc::new(StatsStore::new(LearningStats::default(), None)),
        Arc::new(CacheStore::new(None)),
        provider,
    );

    let response = service
        .handle(ProxyRequest::TranslateSentence {
            text: "我在学习".to_string(),
            difficulty: 3,
            direction: Direction::NativeToTarget,
        })
        .await;

    match response {
        ProxyResponse::Error { error } => {
            // 结构化错误携带端点地址和原始响应体
            assert!(error.url.contains("/v1/chat/completions"));
            assert_eq!(error.status, None);
            assert!(error.body.contains("connection refused"));
        }
        other => panic!("期望结构化错误，得到: {:?}", other),
    }
}

#[tokio::test]
async fn test_escalation_state_is_persisted() {
    let backend = Arc::new(MemoryBackend::new());
    let queue = WriteQueue::spawn(backend.clone());

    let store = SettingsStore::new(enabled_settings(), Some(queue.writer()));
    for _ in 0..3 {
        store.record_terminal_failure();
    }
    queue.flush().await;

    // 自动停用的状态已写入持久存储
    let persisted = backend
        .load("settings")
        .expect("内存后端读取不会失败")
        .expect("设置应当已持久化");
    assert_eq!(persisted["enabled"], serde_json::json!(false));
}

#[tokio::test]
async fn test_settings_updates_survive_write_failures() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_fail_writes(true);
    let queue = WriteQueue::spawn(backend.clone());

    let store = SettingsStore::new(enabled_settings(), Some(queue.writer()));
    store.update(|s| s.difficulty = 5);
    queue.flush().await;

    // 落盘失败被吞掉，内存中的设置和变更通知不受影响
    assert_eq!(store.current().difficulty, 5);
    assert_eq!(backend.load("settings").unwrap(), None);
}

#[tokio::test]
async fn test_stats_load_from_corrupt_blob_resets_to_zero() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .store("stats", &serde_json::json!("not an object"))
        .unwrap();

    let stats = StatsStore::load(backend.as_ref(), None);
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.total_words, 0);
    assert_eq!(snapshot.today_words, 0);
}
