//! 统一的环境变量管理
//!
//! 类型安全的环境变量访问器：每个变量一个零尺寸类型，
//! 解析失败携带变量名和原因。

use std::env;
use std::fmt;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Environment variable '{}': {}",
            self.variable, self.message
        )
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => Err(EnvError {
                variable: Self::NAME.to_string(),
                message: "not set".to_string(),
            }),
        }
    }
}

fn parse_error(name: &str, message: String) -> EnvError {
    EnvError {
        variable: name.to_string(),
        message,
    }
}

/// API相关环境变量
pub mod api {
    use super::*;

    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "LEXIWEAVE_API_KEY";
        const DESCRIPTION: &'static str = "API key for the chat-completion endpoint";

        fn parse(value: &str) -> EnvResult<String> {
            if value.is_empty() {
                Err(parse_error(Self::NAME, "empty value".to_string()))
            } else {
                Ok(value.to_string())
            }
        }
    }

    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "LEXIWEAVE_API_URL";
        const DESCRIPTION: &'static str = "Base URL of the chat-completion endpoint";

        fn parse(value: &str) -> EnvResult<String> {
            if value.starts_with("http://") || value.starts_with("https://") {
                Ok(value.trim_end_matches('/').to_string())
            } else {
                Err(parse_error(
                    Self::NAME,
                    format!("invalid URL '{}'", value),
                ))
            }
        }
    }

    pub struct Model;
    impl EnvVar<String> for Model {
        const NAME: &'static str = "LEXIWEAVE_MODEL";
        const DESCRIPTION: &'static str = "Model name sent with each request";

        fn parse(value: &str) -> EnvResult<String> {
            Ok(value.to_string())
        }
    }
}

/// 运行时行为相关环境变量
pub mod runtime {
    use super::*;

    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "LEXIWEAVE_ENABLED";
        const DESCRIPTION: &'static str = "Master switch for annotation";

        fn parse(value: &str) -> EnvResult<bool> {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(parse_error(
                    Self::NAME,
                    format!("invalid boolean '{}'", value),
                )),
            }
        }
    }

    pub struct Difficulty;
    impl EnvVar<u8> for Difficulty {
        const NAME: &'static str = "LEXIWEAVE_DIFFICULTY";
        const DESCRIPTION: &'static str = "Vocabulary difficulty level (1-5)";

        fn parse(value: &str) -> EnvResult<u8> {
            match value.parse::<u8>() {
                Ok(level @ 1..=5) => Ok(level),
                _ => Err(parse_error(
                    Self::NAME,
                    format!("expected 1-5, got '{}'", value),
                )),
            }
        }
    }

    pub struct MaxConcurrent;
    impl EnvVar<usize> for MaxConcurrent {
        const NAME: &'static str = "LEXIWEAVE_MAX_CONCURRENT";
        const DESCRIPTION: &'static str = "Maximum in-flight element tasks";

        fn parse(value: &str) -> EnvResult<usize> {
            match value.parse::<usize>() {
                Ok(limit) if limit > 0 => Ok(limit),
                _ => Err(parse_error(
                    Self::NAME,
                    format!("expected positive integer, got '{}'", value),
                )),
            }
        }
    }
}
