//! 标注配置管理模块
//!
//! 提供常量表、配置文件加载和环境变量覆盖

pub mod manager;

pub use manager::ConfigManager;

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 翻译客户端相关
    pub const MAX_SENTENCE_CHARS: usize = 500;
    pub const MAX_PARSE_RETRIES: usize = 2;
    pub const PARSE_RETRY_DELAY: Duration = Duration::from_millis(500);
    pub const TRANSPORT_RETRIES: usize = 2;
    pub const TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(1000);
    pub const REQUEST_TEMPERATURE: f32 = 0.3;

    // 失败升级相关
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

    // 缓存相关
    pub const MAX_CACHE_ENTRIES: usize = 2400;
    pub const SENTENCE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    // 页面扫描相关
    pub const MIN_TEXT_LENGTH: usize = 30;
    pub const MIN_CJK_CHARS: usize = 10;
    pub const MIN_LATIN_CHARS: usize = 20;
    pub const CONTEXT_CHARS: usize = 100;

    // 候选标签：块级文本容器
    pub const CANDIDATE_TAGS: &[&str] = &[
        "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td", "th", "dd", "dt",
    ];

    // 排除的标签（结构性/交互性/代码区域）
    pub const EXCLUDED_TAGS: &[&str] = &[
        "script", "style", "code", "pre", "textarea", "input", "select", "noscript", "iframe",
        "nav", "footer", "button", "form",
    ];

    // 排除的class（导航、页脚、广告、评论区等噪音区域）
    pub const EXCLUDED_CLASSES: &[&str] = &[
        "footer",
        "nav",
        "sidebar",
        "menu",
        "navigation",
        "header",
        "ad",
        "advertisement",
        "comment",
        "btn",
        "button",
    ];

    // DOM标记
    pub const PROCESSED_ATTR: &str = "data-lw-processed";
    pub const WORD_CLASS: &str = "lw-word";

    // 默认API设置
    pub const DEFAULT_API_URL: &str = "https://api.openai.com";
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

    // 存储键
    pub const STORAGE_KEY_SETTINGS: &str = "settings";
    pub const STORAGE_KEY_STATS: &str = "stats";
    pub const STORAGE_KEY_SENTENCE_CACHE: &str = "sentence_cache";
    pub const STORAGE_KEY_WORD_DETAIL_CACHE: &str = "word_detail_cache";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "lexiweave.toml",
        ".lexiweave.toml",
        "~/.config/lexiweave/config.toml",
    ];

    /// 难度级别的选词指导
    #[derive(Debug, Clone, Copy)]
    pub struct DifficultyProfile {
        pub level_name: &'static str,
        pub description: &'static str,
        pub guidance: &'static str,
        pub quantity_guide: &'static str,
    }

    /// 难度配置表：1-5级，控制选词的密度和难度
    pub const DIFFICULTY_PROFILES: [DifficultyProfile; 5] = [
        DifficultyProfile {
            level_name: "基础",
            description: "最基础的日常高频词汇，初学者或小学生能理解的简单词",
            guidance: "选择最常用、最简单的词，避免任何书面语、正式用语或专业词汇",
            quantity_guide: "按句子字数的5%选词，最多不超过2个词",
        },
        DifficultyProfile {
            level_name: "常用",
            description: "常用词汇，中学生能理解的词",
            guidance: "选择日常生活和工作中常见的词，避免过于简单的基础词，也避免专业术语",
            quantity_guide: "按句子字数的8%选词，最多不超过4个词",
        },
        DifficultyProfile {
            level_name: "中级",
            description: "中级词汇，高中生或大学生能理解的词",
            guidance: "选择有一定难度的词汇，可包含常见短语，避免太简单或太专业的词",
            quantity_guide: "按句子字数的12%选词，最多不超过6个词",
        },
        DifficultyProfile {
            level_name: "较难",
            description: "较难词汇和习语，需要较高语言水平才能理解",
            guidance: "选择书面语、正式用语、习语和有表达力的词，避免基础常用词",
            quantity_guide: "按句子字数的15%选词，最多不超过8个词",
        },
        DifficultyProfile {
            level_name: "高级",
            description: "高级词汇、专业术语、复杂习语和文学表达",
            guidance: "选择高级词汇、专业术语、复杂习语，不限制难度，避免简单常用词",
            quantity_guide: "按句子字数的20%选词，无上限限制",
        },
    ];

    /// 获取难度配置，越界时回退到中级（3级）
    pub fn difficulty_profile(level: u8) -> &'static DifficultyProfile {
        match level {
            1..=5 => &DIFFICULTY_PROFILES[(level - 1) as usize],
            _ => &DIFFICULTY_PROFILES[2],
        }
    }

    /// 语言代码到自然语言名称的映射，用于提示词拼装
    pub fn language_name(code: &str) -> &str {
        match code {
            "zh-CN" | "zh-TW" | "zh" => "中文",
            "en" => "English",
            "ja" => "日本語",
            "ko" => "한국어",
            "fr" => "Français",
            "de" => "Deutsch",
            "es" => "Español",
            other => other,
        }
    }

    /// API预设（名称、地址、默认模型）
    pub const API_PRESETS: &[(&str, &str, &str)] = &[
        ("OpenAI", "https://api.openai.com", "gpt-4o-mini"),
        (
            "Google Gemini",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-2.0-flash-exp",
        ),
        ("DeepSeek", "https://api.deepseek.com", "deepseek-chat"),
        ("Moonshot", "https://api.moonshot.cn", "moonshot-v1-8k"),
    ];
}
