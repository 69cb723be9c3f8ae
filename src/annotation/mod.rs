//! 标注模块
//!
//! 提供完整的页面词汇标注功能，模块化架构：
//! - **client**: 翻译客户端（聊天补全端点封装与重试）
//! - **parser**: 模型输出的JSON提取与修复
//! - **scanner**: 页面扫描与语言检测
//! - **pipeline**: 有界并发标注管道
//! - **watcher**: 页面变更观察与去抖
//! - **storage**: 键值后端与两级缓存
//! - **settings** / **stats**: 进程级配置与学习统计
//! - **proxy**: 页面侧与后台代理之间的消息协议
//! - **service**: 会话驱动与启用状态机
//! - **config**: 常量表与配置加载
//! - **error**: 统一错误类型
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lexiweave::annotation::{annotate_html, Settings, TranslationClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut settings = Settings::default();
//! settings.enabled = true;
//! let credentials = settings.credentials().expect("配置API档案");
//! let client = Arc::new(TranslationClient::new(credentials, "zh-CN", "en"));
//!
//! let html = b"<html lang=\"zh-CN\"><body><p>...</p></body></html>";
//! let (annotated, outcome) = annotate_html(html, None, settings, client).await?;
//! println!("替换了 {} 处", outcome.replaced_words);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod proxy;
pub mod replace;
pub mod scanner;
pub mod service;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod tasks;
pub mod watcher;

pub use client::{ChatTransport, HttpTransport, RetryPolicy, TranslationClient, TranslationProvider};
pub use error::{AnnotationError, AnnotationResult, ApiFailure};
pub use parser::{TranslationUnit, WordDetail};
pub use pipeline::{AnnotationPipeline, PipelineOutcome};
pub use proxy::{ProxyRequest, ProxyResponse, ProxyService};
pub use scanner::{detect_page_language, resolve_direction, PageScanner};
pub use service::AnnotationService;
pub use settings::{
    ApiCredentials, ApiProfile, Direction, DisplayStyle, Settings, SettingsStore, SiteFilterMode,
};
pub use stats::{LearningStats, StatsStore};
pub use storage::{CacheNamespace, CacheStore, MemoryBackend, RedbBackend, StorageBackend, WriteQueue};
pub use tasks::{TaskRegistry, TaskState};
pub use watcher::{MutationNotifier, MutationWatcher};

use std::sync::Arc;

use crate::parsers::html::{html_to_dom, serialize_document};

/// 对一段HTML执行一次完整的标注遍历（便利函数）
///
/// 使用内存存储（无持久化），适合一次性处理和库内嵌场景。
/// 页面与当前设置不匹配时原样返回输入文档。
pub async fn annotate_html(
    html: &[u8],
    hostname: Option<&str>,
    settings: Settings,
    provider: Arc<dyn TranslationProvider>,
) -> AnnotationResult<(Vec<u8>, PipelineOutcome)> {
    let dom = html_to_dom(html, "utf-8".to_string());
    let settings_store = Arc::new(SettingsStore::new(settings, None));
    let stats_store = Arc::new(StatsStore::new(LearningStats::default(), None));
    let cache_store = Arc::new(CacheStore::new(None));

    let outcome = match AnnotationService::try_new(
        dom.document.clone(),
        hostname,
        settings_store,
        stats_store,
        cache_store,
        provider,
    ) {
        Some(service) => service.run_initial().await,
        None => PipelineOutcome::default(),
    };

    Ok((serialize_document(dom), outcome))
}
