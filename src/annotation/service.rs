//! 标注会话驱动
//!
//! 把扫描器、管道、变更观察器和各个存储编排成一次页面会话，
//! 并承载启用状态机：
//!
//! - `disabled → enabled`：凭据有效时启动变更观察并执行初始标注；
//! - `enabled → disabled`：（手动关闭或连续失败自动停用）停止观察，
//!   已应用的替换保留在页面上。

use std::sync::Arc;

use markup5ever_rcdom::Handle;

use crate::annotation::client::TranslationProvider;
use crate::annotation::pipeline::{AnnotationPipeline, PipelineOutcome};
use crate::annotation::scanner::{detect_page_language, resolve_direction, PageScanner};
use crate::annotation::settings::{Direction, SettingsStore};
use crate::annotation::stats::StatsStore;
use crate::annotation::storage::cache::CacheStore;
use crate::annotation::tasks::TaskRegistry;
use crate::annotation::watcher::{MutationNotifier, MutationWatcher};

/// 页面标注会话
pub struct AnnotationService {
    root: Handle,
    direction: Direction,
    scanner: PageScanner,
    pipeline: AnnotationPipeline,
    watcher: MutationWatcher,
    notifier: Option<MutationNotifier>,
    settings: Arc<SettingsStore>,
}

impl AnnotationService {
    /// 为一个页面创建标注会话
    ///
    /// 与页面不匹配的情况（站点被过滤、功能未启用、凭据缺失、
    /// 页面语言无法确定方向）返回 `None`，这不是错误。
    pub fn try_new(
        root: Handle,
        hostname: Option<&str>,
        settings: Arc<SettingsStore>,
        stats: Arc<StatsStore>,
        cache: Arc<CacheStore>,
        provider: Arc<dyn TranslationProvider>,
    ) -> Option<Self> {
        let current = settings.current();

        if let Some(hostname) = hostname {
            if !current.site_allowed(hostname) {
                tracing::info!("站点 {} 被过滤规则排除，跳过标注", hostname);
                return None;
            }
        }
        if !current.enabled {
            tracing::info!("标注功能未启用，跳过");
            return None;
        }
        if current.credentials().is_none() {
            tracing::info!("未配置API凭据，跳过标注");
            return None;
        }

        let page_language = match detect_page_language(&root) {
            Some(language) => language,
            None => {
                tracing::info!("无法检测页面语言，跳过标注");
                return None;
            }
        };
        let direction = match resolve_direction(&current, &page_language) {
            Some(direction) => direction,
            None => {
                tracing::info!("页面语言 {} 不在学习语言对内，跳过标注", page_language);
                return None;
            }
        };
        tracing::debug!("页面语言 {}，翻译方向 {:?}", page_language, direction);

        let registry = Arc::new(TaskRegistry::new());
        let pipeline = AnnotationPipeline::new(provider, cache, registry, Arc::clone(&settings), stats);
        let (watcher, notifier) = MutationWatcher::new();

        Some(Self {
            root,
            direction,
            scanner: PageScanner::new(direction),
            pipeline,
            watcher,
            notifier: Some(notifier),
            settings,
        })
    }

    /// 本次会话使用的翻译方向
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 取走变更通知句柄
    ///
    /// 页面嵌入方在内容新增时调用它的 `notify()`。所有句柄都被
    /// 释放后 `watch_loop` 结束。
    pub fn take_notifier(&mut self) -> Option<MutationNotifier> {
        self.notifier.take()
    }

    /// 执行初始标注遍历
    pub async fn run_initial(&self) -> PipelineOutcome {
        let candidates = self.scanner.find_candidates(&self.root);
        tracing::info!("初始扫描发现 {} 个候选元素", candidates.len());
        self.pipeline.run(candidates, self.direction).await
    }

    /// 驱动变更触发的重扫和启用状态机，直到所有通知句柄被释放
    pub async fn watch_loop(&mut self) {
        enum Event {
            Trigger,
            ChannelClosed,
            SettingsChanged,
            SettingsGone,
        }

        let mut settings_rx = self.settings.subscribe();
        let mut was_enabled = self.settings.is_enabled();

        loop {
            // select 表达式结束时未完成的分支被丢弃，
            // 事件处理在之后进行，避免与分支借用冲突
            let event = tokio::select! {
                trigger = self.watcher.next_trigger() => match trigger {
                    Some(()) => Event::Trigger,
                    None => Event::ChannelClosed,
                },
                changed = settings_rx.changed() => match changed {
                    Ok(()) => Event::SettingsChanged,
                    Err(_) => Event::SettingsGone,
                },
            };

            match event {
                Event::ChannelClosed | Event::SettingsGone => break,
                Event::Trigger => {
                    if self.settings.is_enabled() {
                        let candidates = self.scanner.find_candidates(&self.root);
                        if !candidates.is_empty() {
                            tracing::debug!("变更触发重扫: {} 个新候选", candidates.len());
                            self.pipeline.run(candidates, self.direction).await;
                        }
                    }
                    self.watcher.rescan_complete();
                }
                Event::SettingsChanged => {
                    let now_enabled = self.settings.is_enabled();
                    if was_enabled && !now_enabled {
                        // 已应用的替换保留在页面上
                        self.watcher.stop();
                        tracing::info!("标注功能已关闭，停止观察页面变化");
                    } else if !was_enabled && now_enabled {
                        if self.settings.current().credentials().is_some() {
                            self.watcher.start();
                            tracing::info!("标注功能已开启，执行标注遍历");
                            self.run_initial().await;
                        }
                    }
                    was_enabled = now_enabled;
                }
            }
        }
    }
}
