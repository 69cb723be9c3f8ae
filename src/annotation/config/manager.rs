//! 配置管理器
//!
//! 从标准路径的TOML配置文件加载设置，再应用环境变量覆盖。
//! 配置文件可以只写关心的字段，缺失字段使用默认值。

use std::path::{Path, PathBuf};

use crate::annotation::config::constants;
use crate::annotation::error::AnnotationResult;
use crate::annotation::settings::{ApiProfile, Settings};
use crate::env::{api, runtime, EnvVar};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 加载设置：配置文件（如果有）+ 环境变量覆盖
    pub fn load_settings() -> Settings {
        let mut settings = match Self::find_config_file() {
            Some(path) => match Self::load_from_path(&path) {
                Ok(settings) => {
                    tracing::debug!("已加载配置文件 {}", path.display());
                    settings
                }
                Err(e) => {
                    tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                    Settings::default()
                }
            },
            None => Settings::default(),
        };
        Self::apply_env_overrides(&mut settings);
        settings
    }

    /// 从指定路径读取配置
    pub fn load_from_path(path: &Path) -> AnnotationResult<Settings> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&raw)?;
        Ok(settings)
    }

    /// 在标准路径中寻找配置文件
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in constants::CONFIG_PATHS {
            let path = expand_home(candidate);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// 应用环境变量覆盖
    ///
    /// 设置了 `LEXIWEAVE_API_KEY` 时注入（或更新）一个名为 `env`
    /// 的API档案并将其设为激活档案。
    pub fn apply_env_overrides(settings: &mut Settings) {
        if let Ok(enabled) = runtime::Enabled::get() {
            settings.enabled = enabled;
        }
        if let Ok(difficulty) = runtime::Difficulty::get() {
            settings.difficulty = difficulty;
        }
        if let Ok(max_concurrent) = runtime::MaxConcurrent::get() {
            settings.max_concurrent = max_concurrent;
        }

        if let Ok(api_key) = api::ApiKey::get() {
            let base_url = api::ApiUrl::get().unwrap_or_default();
            let model = api::Model::get().unwrap_or_default();

            match settings.api_profiles.iter_mut().find(|p| p.id == "env") {
                Some(profile) => {
                    profile.api_key = api_key;
                    if !base_url.is_empty() {
                        profile.base_url = base_url;
                    }
                    if !model.is_empty() {
                        profile.model = model;
                    }
                }
                None => settings.api_profiles.push(ApiProfile {
                    id: "env".to_string(),
                    name: "environment".to_string(),
                    base_url,
                    model,
                    api_key,
                }),
            }
            settings.active_profile = Some("env".to_string());
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &Path) -> std::io::Result<()> {
        let example = r#"# lexiweave 配置文件
# 所有字段都可省略，省略时使用默认值

enabled = true
difficulty = 3          # 1-5
max_concurrent = 3
display_style = "translation-original"
native_language = "zh-CN"
target_language = "en"
reverse_learning = true

site_filter_mode = "blacklist"
blacklist = ["localhost", "127.0.0.1", "192.168.*.*", "10.*.*.*"]
whitelist = []

active_profile = "default"

[[api_profiles]]
id = "default"
name = "OpenAI"
base_url = "https://api.openai.com"
model = "gpt-4o-mini"
api_key = ""
"#;
        std::fs::write(path, example)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::settings::DisplayStyle;

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexiweave.toml");
        std::fs::write(&path, "difficulty = 5\ndisplay_style = \"translation-only\"\n").unwrap();

        let settings = ConfigManager::load_from_path(&path).unwrap();
        assert_eq!(settings.difficulty, 5);
        assert_eq!(settings.display_style, DisplayStyle::TranslationOnly);
        // 未写字段落回默认值
        assert_eq!(settings.max_concurrent, 3);
        assert!(!settings.enabled);
    }

    #[test]
    fn test_example_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.toml");
        ConfigManager::generate_example_config(&path).unwrap();

        let settings = ConfigManager::load_from_path(&path).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.api_profiles.len(), 1);
        assert_eq!(settings.active_profile.as_deref(), Some("default"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "difficulty = \"not a number\"").unwrap();
        assert!(ConfigManager::load_from_path(&path).is_err());
    }
}
