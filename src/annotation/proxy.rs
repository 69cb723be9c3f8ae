//! 内部消息协议
//!
//! 页面侧逻辑与特权后台代理之间的请求/响应协议。每种请求是一次
//! 往返；翻译相关的响应携带结果载荷或结构化错误对象，绝不携带
//! 裸异常。凭据不随消息传递：代理自己持有设置存储并从中解析
//! 当前激活的API档案。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::annotation::client::TranslationProvider;
use crate::annotation::error::ApiFailure;
use crate::annotation::parser::{TranslationUnit, WordDetail};
use crate::annotation::settings::{Direction, Settings, SettingsStore};
use crate::annotation::stats::{LearningStats, StatsStore};
use crate::annotation::storage::cache::{word_detail_cache_key, CacheNamespace, CacheStore};

/// 代理请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProxyRequest {
    #[serde(rename = "GET_SETTINGS")]
    GetSettings,
    #[serde(rename = "GET_STATS")]
    GetStats,
    #[serde(rename = "UPDATE_STATS")]
    UpdateStats { word_count: u64 },
    #[serde(rename = "API_TRANSLATE_SENTENCE")]
    TranslateSentence {
        text: String,
        difficulty: u8,
        direction: Direction,
    },
    #[serde(rename = "API_GET_WORD_DETAIL")]
    GetWordDetail {
        word: String,
        gloss: String,
        context: String,
    },
}

/// 代理响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProxyResponse {
    #[serde(rename = "SETTINGS")]
    Settings { settings: Settings },
    #[serde(rename = "STATS")]
    Stats { stats: LearningStats },
    #[serde(rename = "STATS_UPDATED")]
    StatsUpdated { success: bool },
    #[serde(rename = "SENTENCE_RESULT")]
    SentenceResult { units: Vec<TranslationUnit> },
    #[serde(rename = "WORD_DETAIL")]
    WordDetail { detail: Option<WordDetail> },
    #[serde(rename = "ERROR")]
    Error { error: ApiFailure },
}

/// 后台代理服务
///
/// 持有各个存储和翻译客户端，为页面侧逻辑应答请求。
pub struct ProxyService {
    settings: Arc<SettingsStore>,
    stats: Arc<StatsStore>,
    cache: Arc<CacheStore>,
    provider: Arc<dyn TranslationProvider>,
}

impl ProxyService {
    pub fn new(
        settings: Arc<SettingsStore>,
        stats: Arc<StatsStore>,
        cache: Arc<CacheStore>,
        provider: Arc<dyn TranslationProvider>,
    ) -> Self {
        Self {
            settings,
            stats,
            cache,
            provider,
        }
    }

    /// 应答一次请求
    pub async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        match request {
            ProxyRequest::GetSettings => ProxyResponse::Settings {
                settings: self.settings.current(),
            },
            ProxyRequest::GetStats => ProxyResponse::Stats {
                stats: self.stats.snapshot(),
            },
            ProxyRequest::UpdateStats { word_count } => {
                self.stats.record_words(word_count);
                ProxyResponse::StatsUpdated { success: true }
            }
            ProxyRequest::TranslateSentence {
                text,
                difficulty,
                direction,
            } => match self
                .provider
                .translate_sentence(&text, difficulty, direction)
                .await
            {
                Ok(units) => ProxyResponse::SentenceResult { units },
                Err(failure) => ProxyResponse::Error { error: failure },
            },
            ProxyRequest::GetWordDetail {
                word,
                gloss,
                context,
            } => self.word_detail(&word, &gloss, &context).await,
        }
    }

    /// 词条详情查询（带永久缓存）
    async fn word_detail(&self, word: &str, gloss: &str, context: &str) -> ProxyResponse {
        let settings = self.settings.current();
        let key = word_detail_cache_key(
            word,
            gloss,
            &settings.native_language,
            &settings.target_language,
        );

        if let Some(cached) = self.cache.get(CacheNamespace::WordDetail, &key) {
            if let Ok(detail) = serde_json::from_value::<WordDetail>(cached) {
                return ProxyResponse::WordDetail {
                    detail: Some(detail),
                };
            }
        }

        match self.provider.word_detail(word, gloss, context).await {
            Ok(Some(detail)) => {
                match serde_json::to_value(&detail) {
                    Ok(value) => self.cache.put(CacheNamespace::WordDetail, &key, value),
                    Err(e) => tracing::debug!("词条详情序列化失败，跳过缓存: {}", e),
                }
                ProxyResponse::WordDetail {
                    detail: Some(detail),
                }
            }
            Ok(None) => ProxyResponse::WordDetail { detail: None },
            Err(failure) => ProxyResponse::Error { error: failure },
        }
    }
}
