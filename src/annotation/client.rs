//! 翻译客户端
//!
//! 封装对OpenAI兼容聊天补全端点的调用：按难度和方向拼装提示词、
//! 带线性退避的传输重试、响应结构校验，以及解析失败时的整体重发。
//! 传输层放在trait后面，重试边界可以不起服务器就测到。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::annotation::config::constants;
use crate::annotation::error::ApiFailure;
use crate::annotation::parser::{self, TranslationUnit, WordDetail};
use crate::annotation::settings::{ApiCredentials, Direction};

/// 聊天补全请求体
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub reasoning_effort: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// 聊天补全响应体（字段全部可缺，结构校验在调用侧完成）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// 一次HTTP交换的结果
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP传输层
///
/// `Err` 表示传输失败（连接、超时等），携带错误描述；
/// 非2xx响应以 `Ok` 返回，由重试包装器决定去留。
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn execute(
        &self,
        url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<TransportResponse, String>;
}

/// 基于reqwest的默认传输实现
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn execute(
        &self,
        url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<TransportResponse, String> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string(),
            body,
        })
    }
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 传输层重试次数（非2xx或连接失败）
    pub transport_retries: usize,
    /// 传输层基础退避时长，实际等待为 基础时长 × 已尝试次数
    pub transport_delay: Duration,
    /// 提取失败（结构异常或解析失败）时整体重发的次数
    pub parse_retries: usize,
    /// 整体重发前的固定等待
    pub parse_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transport_retries: constants::TRANSPORT_RETRIES,
            transport_delay: constants::TRANSPORT_RETRY_DELAY,
            parse_retries: constants::MAX_PARSE_RETRIES,
            parse_delay: constants::PARSE_RETRY_DELAY,
        }
    }
}

/// 翻译服务抽象
///
/// 管道和代理层只依赖这个接口；测试用桩实现替换真实客户端。
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// 句子级选词翻译
    ///
    /// 成功时返回通过约束过滤的替换单元列表（可能为空）；
    /// 终端HTTP失败以结构化错误返回。
    async fn translate_sentence(
        &self,
        text: &str,
        difficulty: u8,
        direction: Direction,
    ) -> Result<Vec<TranslationUnit>, ApiFailure>;

    /// 词条详情查询
    async fn word_detail(
        &self,
        word: &str,
        gloss: &str,
        context: &str,
    ) -> Result<Option<WordDetail>, ApiFailure>;
}

/// 翻译客户端
pub struct TranslationClient {
    transport: Arc<dyn ChatTransport>,
    credentials: ApiCredentials,
    native_language: String,
    target_language: String,
    policy: RetryPolicy,
}

enum AttemptOutcome {
    /// 提取成功
    Success(Vec<TranslationUnit>),
    /// 结构异常或内容无法解析，可整体重发
    Extract(String),
    /// 终端HTTP失败，重试已在传输层耗尽
    Terminal(ApiFailure),
}

impl TranslationClient {
    /// 使用默认HTTP传输创建客户端
    pub fn new(credentials: ApiCredentials, native_language: &str, target_language: &str) -> Self {
        Self::with_transport(
            Arc::new(HttpTransport::new()),
            credentials,
            native_language,
            target_language,
            RetryPolicy::default(),
        )
    }

    /// 使用指定传输和重试策略创建客户端
    pub fn with_transport(
        transport: Arc<dyn ChatTransport>,
        credentials: ApiCredentials,
        native_language: &str,
        target_language: &str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            credentials,
            native_language: native_language.to_string(),
            target_language: target_language.to_string(),
            policy,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.credentials.base_url.trim_end_matches('/')
        )
    }

    /// 带线性退避的请求发送
    ///
    /// 非2xx和传输失败共用同一策略：剩余次数内等待后重发，
    /// 耗尽后转为结构化失败。
    async fn fetch_with_retry(&self, request: &ChatRequest) -> Result<TransportResponse, ApiFailure> {
        let url = self.endpoint();
        let retries = self.policy.transport_retries;
        let mut attempt = 0;

        loop {
            match self
                .transport
                .execute(&url, &self.credentials.api_key, request)
                .await
            {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    if attempt >= retries {
                        return Err(ApiFailure::http(
                            response.status,
                            &response.status_text,
                            &url,
                            response.body,
                        ));
                    }
                }
                Err(message) => {
                    if attempt >= retries {
                        return Err(ApiFailure::transport(&url, message));
                    }
                }
            }

            // 线性退避：等待时长随已尝试次数增长
            sleep(self.policy.transport_delay * (attempt as u32 + 1)).await;
            attempt += 1;
        }
    }

    /// 单次完整尝试：请求 → 结构校验 → 内容提取
    async fn attempt_translate(
        &self,
        system_prompt: &str,
        user_text: &str,
        source_text: &str,
    ) -> AttemptOutcome {
        let request = ChatRequest {
            model: self.credentials.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_text.to_string(),
                },
            ],
            temperature: constants::REQUEST_TEMPERATURE,
            reasoning_effort: "low",
        };

        let response = match self.fetch_with_retry(&request).await {
            Ok(response) => response,
            Err(failure) => return AttemptOutcome::Terminal(failure),
        };

        let parsed: ChatResponse = match serde_json::from_str(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => return AttemptOutcome::Extract(format!("响应体不是合法JSON: {}", e)),
        };

        let content = match parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
        {
            Some(content) => content.trim().to_string(),
            None => return AttemptOutcome::Extract("响应数据结构异常".to_string()),
        };

        match parser::parse_units(&content, source_text) {
            Ok(units) => AttemptOutcome::Success(units),
            Err(e) => AttemptOutcome::Extract(e.to_string()),
        }
    }

    fn build_sentence_prompt(&self, difficulty: u8, direction: Direction) -> String {
        let profile = constants::difficulty_profile(difficulty);
        let native_name = constants::language_name(&self.native_language);
        let target_name = constants::language_name(&self.target_language);

        match direction {
            Direction::NativeToTarget => format!(
                "【重要！禁止思考和推理！】直接返回JSON数组，不要任何思考过程和其他内容。\n\n\
                 你是语言学习助手。从{native_name}句子中选择词语返回JSON数组。\n\n\
                 难度级别：{}\n难度说明：{}\n选词指导：{}\n数量限制：{}\n\n\
                 词性原则：根据难度级别自行判断。低难度专注实词（名词、动词、形容词），高难度可选择高级连词、介词短语等有学习价值的词。\n\n\
                 严格要求：\n1. 严格遵守数量限制，不要超过上限\n2. 不选人名、地名、品牌名\n3. 确保词在原文中完整存在\n4. 优先选择有学习价值的词\n\n\
                 返回格式：[{{\"original\":\"原词\",\"translation\":\"{target_name}翻译\"}}]\n\
                 再次强调：直接返回JSON数组，禁止思考推理和额外说明。",
                profile.level_name, profile.description, profile.guidance, profile.quantity_guide,
            ),
            Direction::TargetToNative => format!(
                "[IMPORTANT! NO THINKING OR REASONING!] Return JSON array directly, no thinking process or extra content.\n\n\
                 You are a language learning assistant. Select words from the {target_name} text and return a JSON array.\n\n\
                 Difficulty Level: {}\nLevel Description: {}\nSelection Guidance: {}\nQuantity Limit: {}\n\n\
                 POS Principle: Decide based on difficulty level. Lower difficulty focuses on content words (nouns, verbs, adjectives). Higher difficulty can include advanced conjunctions, prepositions, and other valuable words.\n\n\
                 Requirements:\n1. Strictly follow quantity limits, do not exceed\n2. No proper nouns (names, places, brands)\n3. Word must exist in original text\n4. Prioritize words with learning value\n\n\
                 Format: [{{\"original\":\"word\",\"translation\":\"{native_name} translation\"}}]\n\
                 Reminder: Return JSON array directly, no thinking or explanation.",
                profile.level_name, profile.description, profile.guidance, profile.quantity_guide,
            ),
        }
    }

    fn build_word_detail_prompt(&self) -> String {
        let native_name = constants::language_name(&self.native_language);
        let target_name = constants::language_name(&self.target_language);
        format!(
            "【重要！禁止思考和推理！】直接返回JSON对象，不要任何思考过程。\n\n\
             你是词典助手。根据给定的{target_name}单词和{native_name}释义，返回JSON格式的单词详情。要求：\n\
             1. phonetic: 国际音标（如 /ˈeksəmpəl/）\n\
             2. pos: 词性缩写（如 n. v. adj. adv.）\n\
             3. meaning: {native_name}释义（简洁，1-2个含义）\n\
             4. example_target: 一个简单的{target_name}例句\n\
             5. example_native: 例句的{native_name}翻译\n\n\
             返回格式：{{\"phonetic\":\"...\",\"pos\":\"...\",\"meaning\":\"...\",\"example_target\":\"...\",\"example_native\":\"...\"}}\n\
             再次强调：直接返回JSON对象，禁止思考推理。"
        )
    }
}

#[async_trait]
impl TranslationProvider for TranslationClient {
    async fn translate_sentence(
        &self,
        text: &str,
        difficulty: u8,
        direction: Direction,
    ) -> Result<Vec<TranslationUnit>, ApiFailure> {
        // 截断到固定上限再发送
        let truncated: String = text.chars().take(constants::MAX_SENTENCE_CHARS).collect();
        let system_prompt = self.build_sentence_prompt(difficulty, direction);

        // 提取失败时整体重发：结构异常与解析失败共用同一条策略
        for attempt in 0..=self.policy.parse_retries {
            match self
                .attempt_translate(&system_prompt, &truncated, &truncated)
                .await
            {
                AttemptOutcome::Success(units) => return Ok(units),
                AttemptOutcome::Terminal(failure) => return Err(failure),
                AttemptOutcome::Extract(reason) => {
                    if attempt < self.policy.parse_retries {
                        tracing::warn!(
                            "内容提取失败（第 {}/{} 次尝试），重发请求: {}",
                            attempt + 1,
                            self.policy.parse_retries + 1,
                            reason
                        );
                        sleep(self.policy.parse_delay).await;
                    } else {
                        tracing::error!("内容提取在所有重试后仍失败，返回空结果: {}", reason);
                    }
                }
            }
        }

        Ok(Vec::new())
    }

    async fn word_detail(
        &self,
        word: &str,
        gloss: &str,
        context: &str,
    ) -> Result<Option<WordDetail>, ApiFailure> {
        let request = ChatRequest {
            model: self.credentials.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: self.build_word_detail_prompt(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("单词: {}\n释义: {}\n原文语境: {}", word, gloss, context),
                },
            ],
            temperature: constants::REQUEST_TEMPERATURE,
            reasoning_effort: "low",
        };

        let response = self.fetch_with_retry(&request).await?;

        let parsed: ChatResponse = match serde_json::from_str(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("词条详情响应体不是合法JSON: {}", e);
                return Ok(None);
            }
        };

        let content = match parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
        {
            Some(content) => content.trim().to_string(),
            None => {
                tracing::warn!("词条详情响应数据结构异常");
                return Ok(None);
            }
        };

        Ok(parser::parse_word_detail(&content))
    }
}
