//! 集成测试公共模块
//!
//! 提供桩翻译客户端、测试页面构建和并发探针等共享工具。

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use markup5ever_rcdom::{Handle, RcDom};

use lexiweave::annotation::{
    ApiFailure, ApiProfile, Direction, Settings, SettingsStore, TranslationProvider,
    TranslationUnit, WordDetail,
};
use lexiweave::parsers::html::{get_node_name, html_to_dom};

/// 含有目标词"学习"的中文段落（长度和汉字数都满足扫描阈值）
pub const ZH_PARAGRAPH: &str =
    "我每天都坚持学习新的知识，不断积累让自己稳步进步，这种习惯是一件终身受益的事情。";

/// 构建带唯一编号的中文段落，避免句子缓存在元素之间串联
pub fn zh_paragraph(index: usize) -> String {
    format!("第{}段：{}", index, ZH_PARAGRAPH)
}

/// 用若干中文段落构建测试页面
pub fn zh_page(paragraphs: usize) -> String {
    let body: String = (0..paragraphs)
        .map(|i| format!("<p>{}</p>", zh_paragraph(i)))
        .collect();
    format!("<html lang=\"zh-CN\"><body>{}</body></html>", body)
}

pub fn parse_dom(html: &str) -> RcDom {
    html_to_dom(html.as_bytes(), "utf-8".to_string())
}

/// 收集指定标签的所有元素
pub fn find_tags(node: &Handle, tag: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_tags(node, tag, &mut found);
    found
}

fn collect_tags(node: &Handle, tag: &str, found: &mut Vec<Handle>) {
    if get_node_name(node) == Some(tag) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_tags(child, tag, found);
    }
}

/// 向body末尾追加一个段落（模拟页面动态插入内容）
pub fn append_paragraph(dom: &RcDom, text: &str) {
    let body = find_tags(&dom.document, "body")
        .into_iter()
        .next()
        .expect("页面应当有body");
    let fragment = parse_dom(&format!("<html><body><p>{}</p></body></html>", text));
    let new_p = find_tags(&fragment.document, "p")
        .into_iter()
        .next()
        .expect("片段应当有p");
    body.children.borrow_mut().push(new_p);
}

/// 带有效凭据的已启用设置
pub fn enabled_settings() -> Settings {
    let mut settings = Settings::default();
    settings.enabled = true;
    settings.api_profiles.push(ApiProfile {
        id: "test".to_string(),
        name: "test".to_string(),
        base_url: "https://api.example.com".to_string(),
        model: "test-model".to_string(),
        api_key: "sk-test".to_string(),
    });
    settings.active_profile = Some("test".to_string());
    settings
}

/// 并发探针：记录同一时刻在飞的调用数峰值
#[derive(Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(current, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// 可配置的桩翻译客户端
pub struct StubProvider {
    /// 每次调用返回的替换单元
    pub units: Vec<TranslationUnit>,
    /// 每次调用前挂起的时长，用于制造交错
    pub delay: Duration,
    /// 始终返回终端传输失败
    pub fail: AtomicBool,
    /// 调用计数
    pub calls: AtomicUsize,
    /// 并发探针
    pub probe: Option<Arc<ConcurrencyProbe>>,
    /// 调用若干次后翻转设置开关（模拟运行中停用）
    pub disable_after: Option<(usize, Arc<SettingsStore>)>,
}

impl StubProvider {
    pub fn returning(original: &str, translation: &str) -> Self {
        Self {
            units: vec![TranslationUnit {
                original: original.to_string(),
                translation: translation.to_string(),
            }],
            delay: Duration::from_millis(0),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            probe: None,
            disable_after: None,
        }
    }

    pub fn failing() -> Self {
        let mut stub = Self::returning("学习", "learning");
        stub.fail = AtomicBool::new(true);
        stub
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for StubProvider {
    async fn translate_sentence(
        &self,
        _text: &str,
        _difficulty: u8,
        _direction: Direction,
    ) -> Result<Vec<TranslationUnit>, ApiFailure> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(probe) = &self.probe {
            probe.exit();
        }

        if let Some((threshold, settings)) = &self.disable_after {
            if call_index >= *threshold {
                settings.set_enabled(false);
            }
        }

        if self.fail.load(Ordering::SeqCst) {
            Err(ApiFailure::transport(
                "https://api.example.com/v1/chat/completions",
                "connection refused".to_string(),
            ))
        } else {
            Ok(self.units.clone())
        }
    }

    async fn word_detail(
        &self,
        _word: &str,
        _gloss: &str,
        _context: &str,
    ) -> Result<Option<WordDetail>, ApiFailure> {
        Ok(None)
    }
}
