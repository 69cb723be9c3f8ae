//! 标注模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 终端HTTP失败的结构化描述
///
/// 携带状态码、状态文本、请求地址和原始响应体，
/// 调用方据此决定是否触发自动停用，绝不以裸异常形式穿越边界。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub status: Option<u16>,
    pub status_text: String,
    pub url: String,
    pub body: String,
}

impl ApiFailure {
    /// 创建非2xx响应的失败描述
    pub fn http(status: u16, status_text: &str, url: &str, body: String) -> Self {
        Self {
            status: Some(status),
            status_text: status_text.to_string(),
            url: url.to_string(),
            body,
        }
    }

    /// 创建传输层失败的失败描述（无状态码）
    pub fn transport(url: &str, message: String) -> Self {
        Self {
            status: None,
            status_text: "transport error".to_string(),
            url: url.to_string(),
            body: message,
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(
                f,
                "HTTP {} {} ({}): {}",
                code, self.status_text, self.url, self.body
            ),
            None => write!(f, "传输失败 ({}): {}", self.url, self.body),
        }
    }
}

/// 标注错误类型
#[derive(Error, Debug, Clone)]
pub enum AnnotationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// API调用失败（终端失败，重试已耗尽）
    #[error("API调用失败: {0}")]
    ApiError(ApiFailure),

    /// 响应结构异常（缺少预期字段）
    #[error("响应数据结构异常: {0}")]
    ShapeError(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 存储错误
    #[error("存储错误: {0}")]
    StorageError(String),

    /// 扫描错误
    #[error("页面扫描错误: {0}")]
    ScanError(String),

    /// 管道处理错误
    #[error("管道处理错误: {0}")]
    PipelineError(String),

    /// 功能已停用
    #[error("标注功能已停用")]
    Disabled,

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl AnnotationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            AnnotationError::ApiError(_) => true,
            AnnotationError::ShapeError(_) => true,
            AnnotationError::ParseError(_) => true,
            AnnotationError::StorageError(_) => true,
            AnnotationError::ConfigError(_) => false,
            AnnotationError::ScanError(_) => false,
            AnnotationError::PipelineError(_) => false,
            AnnotationError::Disabled => false,
            AnnotationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AnnotationError::ConfigError(_) => ErrorSeverity::Critical,
            AnnotationError::ApiError(_) => ErrorSeverity::Warning,
            AnnotationError::ShapeError(_) => ErrorSeverity::Warning,
            AnnotationError::ParseError(_) => ErrorSeverity::Warning,
            AnnotationError::StorageError(_) => ErrorSeverity::Info,
            AnnotationError::ScanError(_) => ErrorSeverity::Error,
            AnnotationError::PipelineError(_) => ErrorSeverity::Error,
            AnnotationError::Disabled => ErrorSeverity::Info,
            AnnotationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            AnnotationError::ConfigError(_) => ErrorCategory::Configuration,
            AnnotationError::ApiError(_) => ErrorCategory::Network,
            AnnotationError::ShapeError(_) => ErrorCategory::Shape,
            AnnotationError::ParseError(_) => ErrorCategory::Parsing,
            AnnotationError::StorageError(_) => ErrorCategory::Storage,
            AnnotationError::ScanError(_) => ErrorCategory::Scan,
            AnnotationError::PipelineError(_) => ErrorCategory::Pipeline,
            AnnotationError::Disabled => ErrorCategory::Lifecycle,
            AnnotationError::InternalError(_) => ErrorCategory::Internal,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Shape,
    Parsing,
    Storage,
    Scan,
    Pipeline,
    Lifecycle,
    Internal,
}

/// 标准错误转换
impl From<serde_json::Error> for AnnotationError {
    fn from(error: serde_json::Error) -> Self {
        AnnotationError::ParseError(format!("JSON序列化错误: {}", error))
    }
}

impl From<std::io::Error> for AnnotationError {
    fn from(error: std::io::Error) -> Self {
        AnnotationError::StorageError(format!("IO错误: {}", error))
    }
}

impl From<toml::de::Error> for AnnotationError {
    fn from(error: toml::de::Error) -> Self {
        AnnotationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

/// 错误结果类型别名
pub type AnnotationResult<T> = Result<T, AnnotationError>;
