//! 设置存储模块
//!
//! 将原先散落在各个执行环境中的全局可变设置重构为
//! 单一属主的配置对象加变更通知机制：所有组件通过
//! `watch` 通道观察设置变化，写入方只有一个。
//! 站点过滤、API配置档案解析和失败升级计数也集中在这里。

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::annotation::config::constants;
use crate::annotation::storage::backend::StoreWriter;

/// 翻译方向
///
/// 决定提示词的措辞和页面资格判定的字符阈值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// 母语页面 → 目标语言词汇
    #[serde(rename = "native-to-target")]
    NativeToTarget,
    /// 目标语言页面 → 母语词汇（反向学习）
    #[serde(rename = "target-to-native")]
    TargetToNative,
}

impl Direction {
    /// 缓存键中使用的稳定标识
    pub fn as_key(&self) -> &'static str {
        match self {
            Direction::NativeToTarget => "native-to-target",
            Direction::TargetToNative => "target-to-native",
        }
    }
}

/// 替换内容的显示样式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayStyle {
    /// 仅显示译文
    #[serde(rename = "translation-only")]
    TranslationOnly,
    /// 原词(译文)
    #[serde(rename = "original-translation")]
    OriginalTranslation,
    /// 译文(原词)
    #[serde(rename = "translation-original")]
    TranslationOriginal,
}

impl Default for DisplayStyle {
    fn default() -> Self {
        DisplayStyle::TranslationOriginal
    }
}

/// 站点过滤模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteFilterMode {
    #[serde(rename = "blacklist")]
    Blacklist,
    #[serde(rename = "whitelist")]
    Whitelist,
}

impl Default for SiteFilterMode {
    fn default() -> Self {
        SiteFilterMode::Blacklist
    }
}

/// 一组API凭据档案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiProfile {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

/// 解析后的有效API凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

/// 进程级配置对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    pub difficulty: u8,
    pub max_concurrent: usize,
    pub site_filter_mode: SiteFilterMode,
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
    pub api_profiles: Vec<ApiProfile>,
    pub active_profile: Option<String>,
    pub display_style: DisplayStyle,
    pub native_language: String,
    pub target_language: String,
    pub reverse_learning: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            difficulty: 3,
            max_concurrent: 3,
            site_filter_mode: SiteFilterMode::Blacklist,
            blacklist: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "192.168.*.*".to_string(),
                "10.*.*.*".to_string(),
            ],
            whitelist: Vec::new(),
            api_profiles: Vec::new(),
            active_profile: None,
            display_style: DisplayStyle::default(),
            native_language: "zh-CN".to_string(),
            target_language: "en".to_string(),
            reverse_learning: true,
        }
    }
}

impl Settings {
    /// 当前激活的API档案
    pub fn active_profile(&self) -> Option<&ApiProfile> {
        let id = self.active_profile.as_deref()?;
        self.api_profiles.iter().find(|p| p.id == id)
    }

    /// 解析有效凭据：优先激活档案，空字段回退到默认值
    pub fn credentials(&self) -> Option<ApiCredentials> {
        let profile = self.active_profile().or_else(|| self.api_profiles.first())?;
        if profile.api_key.is_empty() {
            return None;
        }
        Some(ApiCredentials {
            base_url: if profile.base_url.is_empty() {
                constants::DEFAULT_API_URL.to_string()
            } else {
                profile.base_url.clone()
            },
            model: if profile.model.is_empty() {
                constants::DEFAULT_MODEL.to_string()
            } else {
                profile.model.clone()
            },
            api_key: profile.api_key.clone(),
        })
    }

    /// 判断站点是否允许启用标注
    ///
    /// 黑名单模式：命中列表则禁用；白名单模式：未命中则禁用。
    pub fn site_allowed(&self, hostname: &str) -> bool {
        match self.site_filter_mode {
            SiteFilterMode::Blacklist => !hostname_in_list(hostname, &self.blacklist),
            SiteFilterMode::Whitelist => hostname_in_list(hostname, &self.whitelist),
        }
    }
}

/// 通配符模式匹配：`*` 匹配任意字符串，`.` 按字面转义
pub fn hostname_in_list(hostname: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        let escaped = pattern.replace('.', "\\.").replace('*', ".*");
        match Regex::new(&format!("^{}$", escaped)) {
            Ok(re) => re.is_match(hostname),
            Err(_) => false,
        }
    })
}

/// 设置存储
///
/// 单一写入方，所有读取方通过 `subscribe()` 观察变更。
/// 持久化写入走后台写队列，失败不影响调用方。
pub struct SettingsStore {
    tx: watch::Sender<Settings>,
    enabled_flag: Arc<AtomicBool>,
    consecutive_failures: AtomicU32,
    notices: broadcast::Sender<String>,
    writer: Option<StoreWriter>,
    lock: Mutex<()>,
}

impl SettingsStore {
    /// 创建设置存储
    pub fn new(initial: Settings, writer: Option<StoreWriter>) -> Self {
        let enabled_flag = Arc::new(AtomicBool::new(initial.enabled));
        let (tx, _) = watch::channel(initial);
        let (notices, _) = broadcast::channel(16);
        Self {
            tx,
            enabled_flag,
            consecutive_failures: AtomicU32::new(0),
            notices,
            writer,
            lock: Mutex::new(()),
        }
    }

    /// 当前设置的快照
    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// 订阅设置变更
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// 订阅用户可见的通知
    pub fn subscribe_notices(&self) -> broadcast::Receiver<String> {
        self.notices.subscribe()
    }

    /// 管道使用的实时开关标志
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled_flag)
    }

    /// 功能当前是否启用
    pub fn is_enabled(&self) -> bool {
        self.enabled_flag.load(Ordering::SeqCst)
    }

    /// 修改设置：变更被通知给所有订阅方并异步持久化
    pub fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut settings = self.tx.borrow().clone();
        mutate(&mut settings);
        self.enabled_flag.store(settings.enabled, Ordering::SeqCst);
        self.persist(&settings);
        let _ = self.tx.send(settings);
    }

    /// 切换启用状态
    pub fn set_enabled(&self, enabled: bool) {
        self.update(|s| s.enabled = enabled);
        if enabled {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    /// 记录一次终端API失败
    ///
    /// 连续失败达到阈值时自动停用功能、持久化并发出可见通知。
    /// 返回本次调用是否触发了自动停用。
    pub fn record_terminal_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= constants::MAX_CONSECUTIVE_FAILURES && self.is_enabled() {
            self.set_enabled(false);
            self.notify("API 连续请求失败，已自动关闭。请检查设置后重新开启。");
            true
        } else {
            false
        }
    }

    /// 成功调用后重置失败计数
    pub fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// 发送用户可见通知
    pub fn notify(&self, message: &str) {
        tracing::warn!("{}", message);
        let _ = self.notices.send(message.to_string());
    }

    fn persist(&self, settings: &Settings) {
        if let Some(writer) = &self.writer {
            match serde_json::to_value(settings) {
                Ok(value) => writer.write(constants::STORAGE_KEY_SETTINGS, value),
                Err(e) => tracing::debug!("设置序列化失败，跳过持久化: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_key(key: &str) -> Settings {
        let mut settings = Settings::default();
        settings.api_profiles.push(ApiProfile {
            id: "p1".to_string(),
            name: "test".to_string(),
            base_url: String::new(),
            model: String::new(),
            api_key: key.to_string(),
        });
        settings.active_profile = Some("p1".to_string());
        settings
    }

    #[test]
    fn test_site_filter_glob_matching() {
        let patterns = vec!["192.168.*.*".to_string(), "example.com".to_string()];
        assert!(hostname_in_list("192.168.1.20", &patterns));
        assert!(hostname_in_list("example.com", &patterns));
        // `.` 按字面匹配，不是正则元字符
        assert!(!hostname_in_list("exampleXcom", &patterns));
        assert!(!hostname_in_list("sub.example.com", &patterns));
    }

    #[test]
    fn test_blacklist_and_whitelist_modes() {
        let mut settings = Settings::default();
        assert!(!settings.site_allowed("localhost"));
        assert!(settings.site_allowed("news.example.org"));

        settings.site_filter_mode = SiteFilterMode::Whitelist;
        settings.whitelist = vec!["*.example.org".to_string()];
        assert!(settings.site_allowed("news.example.org"));
        assert!(!settings.site_allowed("other.site"));
    }

    #[test]
    fn test_credentials_fall_back_to_defaults() {
        let settings = settings_with_key("sk-test");
        let creds = settings.credentials().unwrap();
        assert_eq!(creds.base_url, constants::DEFAULT_API_URL);
        assert_eq!(creds.model, constants::DEFAULT_MODEL);

        let empty = Settings::default();
        assert!(empty.credentials().is_none());
    }

    #[test]
    fn test_update_notifies_subscribers() {
        let store = SettingsStore::new(Settings::default(), None);
        let rx = store.subscribe();
        store.update(|s| s.difficulty = 5);
        assert_eq!(rx.borrow().difficulty, 5);
        assert_eq!(store.current().difficulty, 5);
    }

    #[test]
    fn test_escalation_threshold_disables_feature() {
        let store = SettingsStore::new(settings_with_key("sk-test"), None);
        store.set_enabled(true);
        let mut notices = store.subscribe_notices();

        assert!(!store.record_terminal_failure());
        assert!(!store.record_terminal_failure());
        assert!(store.record_terminal_failure());
        assert!(!store.is_enabled());
        assert!(notices.try_recv().is_ok());
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let store = SettingsStore::new(settings_with_key("sk-test"), None);
        store.set_enabled(true);
        store.record_terminal_failure();
        store.record_terminal_failure();
        store.reset_failures();
        assert!(!store.record_terminal_failure());
        assert!(store.is_enabled());
    }
}
