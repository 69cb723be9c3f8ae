//! 标注管道
//!
//! 有界并发驱动器：同一时刻最多 `max_concurrent` 个元素任务在飞，
//! 一个完成立即调度下一个，没有批次间隔。每个元素恰好处理一次：
//! 声明 → 查缓存或调用翻译客户端 → 就地替换 → 上报统计 → 标记完成。
//!
//! 调度前检查实时开关；停用只阻止新调度，在飞任务会跑完并标记完成，
//! 避免元素卡在处理中状态。写DOM前会再次确认开关，迟到的响应
//! 不会在停用后修改页面。重试策略完全在翻译客户端内部，
//! 管道自身从不重试单元。

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::annotation::client::TranslationProvider;
use crate::annotation::config::constants;
use crate::annotation::parser::TranslationUnit;
use crate::annotation::replace::apply_units;
use crate::annotation::scanner::PageElement;
use crate::annotation::settings::{Direction, SettingsStore};
use crate::annotation::stats::StatsStore;
use crate::annotation::storage::cache::{sentence_cache_key, CacheNamespace, CacheStore};
use crate::annotation::tasks::TaskRegistry;
use crate::parsers::html::set_node_attr;

/// 一次管道运行的汇总结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// 实际处理（进入done状态）的元素数
    pub processed: usize,
    /// 完成的替换总数
    pub replaced_words: usize,
    /// 终端API失败次数
    pub failures: usize,
}

/// 标注管道
pub struct AnnotationPipeline {
    provider: Arc<dyn TranslationProvider>,
    cache: Arc<CacheStore>,
    registry: Arc<TaskRegistry>,
    settings: Arc<SettingsStore>,
    stats: Arc<StatsStore>,
}

struct ElementOutcome {
    replaced: usize,
    failed: bool,
}

impl AnnotationPipeline {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        cache: Arc<CacheStore>,
        registry: Arc<TaskRegistry>,
        settings: Arc<SettingsStore>,
        stats: Arc<StatsStore>,
    ) -> Self {
        Self {
            provider,
            cache,
            registry,
            settings,
            stats,
        }
    }

    /// 处理一批元素，使用设置中的并发上限
    pub async fn run(&self, elements: Vec<PageElement>, direction: Direction) -> PipelineOutcome {
        let limit = self.settings.current().max_concurrent.max(1);
        self.run_with_limit(elements, direction, limit).await
    }

    /// 处理一批元素
    ///
    /// 完成顺序不确定（最快的调用先返回），文档顺序只决定调度顺序。
    pub async fn run_with_limit(
        &self,
        elements: Vec<PageElement>,
        direction: Direction,
        limit: usize,
    ) -> PipelineOutcome {
        let total = elements.len();
        if total == 0 {
            return PipelineOutcome::default();
        }

        tracing::debug!("管道启动: {} 个元素，并发上限 {}", total, limit);

        let mut outcome = PipelineOutcome::default();
        let mut tasks = stream::iter(
            elements
                .into_iter()
                .map(|element| self.process_element(element, direction)),
        )
        .buffer_unordered(limit.max(1));

        while let Some(result) = tasks.next().await {
            if let Some(element_outcome) = result {
                outcome.processed += 1;
                outcome.replaced_words += element_outcome.replaced;
                if element_outcome.failed {
                    outcome.failures += 1;
                }
            }
        }

        tracing::debug!(
            "管道结束: 处理 {} 个元素，替换 {} 处，失败 {} 次",
            outcome.processed,
            outcome.replaced_words,
            outcome.failures
        );
        outcome
    }

    /// 单个元素的完整生命周期
    async fn process_element(
        &self,
        element: PageElement,
        direction: Direction,
    ) -> Option<ElementOutcome> {
        let enabled = self.settings.enabled_flag();

        // 调度前检查实时开关：停用后不再派发新任务
        if !enabled.load(Ordering::SeqCst) {
            return None;
        }

        // 声明与标记之间没有挂起点，检查加标记是原子的
        if !self.registry.try_claim(element.id) {
            return None;
        }
        set_node_attr(&element.handle, constants::PROCESSED_ATTR, Some("processing".to_string()));

        let truncated: String = element
            .text
            .chars()
            .take(constants::MAX_SENTENCE_CHARS)
            .collect();
        let cache_key = sentence_cache_key(direction.as_key(), &truncated);

        let mut failed = false;
        let units: Vec<TranslationUnit> = match self.lookup_cache(&cache_key) {
            Some(cached) => cached,
            None => {
                let settings = self.settings.current();
                match self
                    .provider
                    .translate_sentence(&element.text, settings.difficulty, direction)
                    .await
                {
                    Ok(units) => {
                        self.settings.reset_failures();
                        match serde_json::to_value(&units) {
                            Ok(value) => {
                                self.cache.put(CacheNamespace::Sentence, &cache_key, value)
                            }
                            Err(e) => tracing::debug!("替换单元序列化失败，跳过缓存: {}", e),
                        }
                        units
                    }
                    Err(failure) => {
                        tracing::error!("元素 {} 翻译失败: {}", element.id, failure);
                        self.settings.record_terminal_failure();
                        failed = true;
                        Vec::new()
                    }
                }
            }
        };

        // 写DOM前重新确认开关，停用后迟到的响应不再修改页面
        let mut replaced = 0;
        if !units.is_empty() && enabled.load(Ordering::SeqCst) {
            let style = self.settings.current().display_style;
            replaced = apply_units(&element.handle, &units, style);
            if replaced > 0 {
                self.stats.record_words(replaced as u64);
            }
        }

        // 无论成败都标记完成，元素绝不卡在处理中状态
        self.registry.mark_done(element.id);
        set_node_attr(&element.handle, constants::PROCESSED_ATTR, Some("done".to_string()));

        Some(ElementOutcome { replaced, failed })
    }

    fn lookup_cache(&self, key: &str) -> Option<Vec<TranslationUnit>> {
        let value = self.cache.get(CacheNamespace::Sentence, key)?;
        match serde_json::from_value(value) {
            Ok(units) => Some(units),
            Err(e) => {
                tracing::debug!("缓存条目反序列化失败，按未命中处理: {}", e);
                None
            }
        }
    }
}
