//! lexiweave 命令行入口
//!
//! `annotate` 读取HTML文档（文件、URL或标准输入），执行一次标注
//! 遍历后输出文档；`word` 查询单个词条的详情；`init-config`
//! 生成示例配置文件。

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

use lexiweave::annotation::config::ConfigManager;
use lexiweave::annotation::{
    AnnotationError, AnnotationResult, AnnotationService, ApiProfile, CacheStore, DisplayStyle,
    LearningStats, RedbBackend, Settings, SettingsStore, StatsStore, StorageBackend,
    TranslationClient, TranslationProvider, WriteQueue,
};
use lexiweave::parsers::html::{html_to_dom, serialize_document};

#[derive(Parser)]
#[command(name = "lexiweave", version, about = "为网页编织沉浸式词汇标注")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 标注一个HTML文档
    Annotate(AnnotateArgs),
    /// 查询词条详情
    Word(WordArgs),
    /// 生成示例配置文件
    InitConfig {
        #[arg(default_value = "lexiweave.toml")]
        path: PathBuf,
    },
}

#[derive(Args)]
struct AnnotateArgs {
    /// 输入：文件路径、URL，或 `-` 读取标准输入
    input: String,

    /// 输出文件，缺省写到标准输出
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 难度级别 1-5
    #[arg(long)]
    difficulty: Option<u8>,

    /// 显示样式: translation-only | original-translation | translation-original
    #[arg(long)]
    style: Option<String>,

    /// 并发上限
    #[arg(long)]
    concurrency: Option<usize>,

    /// 母语代码（如 zh-CN）
    #[arg(long)]
    native_lang: Option<String>,

    /// 目标语言代码（如 en）
    #[arg(long)]
    target_lang: Option<String>,

    /// API基础地址
    #[arg(long)]
    api_url: Option<String>,

    /// API密钥
    #[arg(long)]
    api_key: Option<String>,

    /// 模型名称
    #[arg(long)]
    model: Option<String>,

    /// 持久化目录（缓存与统计），缺省不持久化
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 站点过滤使用的主机名，URL输入时自动推断
    #[arg(long)]
    hostname: Option<String>,
}

#[derive(Args)]
struct WordArgs {
    /// 要查询的词
    word: String,
    /// 页面上显示的释义
    gloss: String,
    /// 原文语境
    #[arg(default_value = "")]
    context: String,

    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Annotate(args) => annotate(args).await,
        Command::Word(args) => word(args).await,
        Command::InitConfig { path } => init_config(path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn annotate(args: AnnotateArgs) -> AnnotationResult<()> {
    let mut settings = ConfigManager::load_settings();
    apply_overrides(&mut settings, &args)?;
    // 命令行调用本身就是启用意图
    settings.enabled = true;

    let (html, inferred_hostname) = read_input(&args.input).await?;
    let hostname = args.hostname.clone().or(inferred_hostname);

    let credentials = settings
        .credentials()
        .ok_or_else(|| AnnotationError::ConfigError("未配置API凭据（档案或 LEXIWEAVE_API_KEY）".to_string()))?;
    let provider: Arc<dyn TranslationProvider> = Arc::new(TranslationClient::new(
        credentials,
        &settings.native_language,
        &settings.target_language,
    ));

    // 存储：指定了持久化目录时使用redb，否则全部驻留内存
    let (backend, queue) = match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let backend: Arc<dyn StorageBackend> =
                Arc::new(RedbBackend::open(dir.join("lexiweave.redb"))?);
            let queue = WriteQueue::spawn(Arc::clone(&backend));
            (Some(backend), Some(queue))
        }
        None => (None, None),
    };
    let writer = queue.as_ref().map(|q| q.writer());

    let settings_store = Arc::new(SettingsStore::new(settings, writer.clone()));
    let (stats_store, cache_store) = match &backend {
        Some(backend) => (
            Arc::new(StatsStore::load(backend.as_ref(), writer.clone())),
            Arc::new(CacheStore::load(backend.as_ref(), writer)),
        ),
        None => (
            Arc::new(StatsStore::new(LearningStats::default(), None)),
            Arc::new(CacheStore::new(None)),
        ),
    };

    let mut notices = settings_store.subscribe_notices();

    let dom = html_to_dom(&html, "utf-8".to_string());
    match AnnotationService::try_new(
        dom.document.clone(),
        hostname.as_deref(),
        Arc::clone(&settings_store),
        Arc::clone(&stats_store),
        cache_store,
        provider,
    ) {
        Some(service) => {
            let outcome = service.run_initial().await;
            let stats = stats_store.snapshot();
            tracing::info!(
                "标注完成: 处理 {} 个元素，替换 {} 处，今日累计 {} 词",
                outcome.processed,
                outcome.replaced_words,
                stats.today_words
            );
        }
        None => {
            tracing::info!("页面与当前设置不匹配，文档原样输出");
        }
    }

    // 自动停用等升级事件对用户可见
    while let Ok(notice) = notices.try_recv() {
        eprintln!("{}", notice);
    }

    if let Some(queue) = queue {
        queue.shutdown().await;
    }

    write_output(args.output.as_deref(), &serialize_document(dom))?;
    Ok(())
}

async fn word(args: WordArgs) -> AnnotationResult<()> {
    let mut settings = ConfigManager::load_settings();
    override_profile(
        &mut settings,
        args.api_url.as_deref(),
        args.api_key.as_deref(),
        args.model.as_deref(),
    );

    let credentials = settings
        .credentials()
        .ok_or_else(|| AnnotationError::ConfigError("未配置API凭据（档案或 LEXIWEAVE_API_KEY）".to_string()))?;
    let client = TranslationClient::new(
        credentials,
        &settings.native_language,
        &settings.target_language,
    );

    match client
        .word_detail(&args.word, &args.gloss, &args.context)
        .await
    {
        Ok(Some(detail)) => {
            println!("{}", serde_json::to_string_pretty(&detail)?);
            Ok(())
        }
        Ok(None) => {
            println!("暂无释义");
            Ok(())
        }
        Err(failure) => Err(AnnotationError::ApiError(failure)),
    }
}

fn init_config(path: PathBuf) -> AnnotationResult<()> {
    ConfigManager::generate_example_config(&path)?;
    println!("已生成示例配置文件: {}", path.display());
    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &AnnotateArgs) -> AnnotationResult<()> {
    if let Some(difficulty) = args.difficulty {
        if !(1..=5).contains(&difficulty) {
            return Err(AnnotationError::ConfigError(format!(
                "难度级别必须在1-5之间: {}",
                difficulty
            )));
        }
        settings.difficulty = difficulty;
    }
    if let Some(style) = &args.style {
        settings.display_style = parse_style(style)?;
    }
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err(AnnotationError::ConfigError("并发上限不能为0".to_string()));
        }
        settings.max_concurrent = concurrency;
    }
    if let Some(native) = &args.native_lang {
        settings.native_language = native.clone();
    }
    if let Some(target) = &args.target_lang {
        settings.target_language = target.clone();
    }
    override_profile(
        settings,
        args.api_url.as_deref(),
        args.api_key.as_deref(),
        args.model.as_deref(),
    );
    Ok(())
}

/// 命令行指定的凭据覆盖为一个名为 `cli` 的激活档案
fn override_profile(
    settings: &mut Settings,
    api_url: Option<&str>,
    api_key: Option<&str>,
    model: Option<&str>,
) {
    if api_url.is_none() && api_key.is_none() && model.is_none() {
        return;
    }

    let base = settings.credentials();
    let profile = ApiProfile {
        id: "cli".to_string(),
        name: "command line".to_string(),
        base_url: api_url
            .map(str::to_string)
            .or_else(|| base.as_ref().map(|c| c.base_url.clone()))
            .unwrap_or_default(),
        model: model
            .map(str::to_string)
            .or_else(|| base.as_ref().map(|c| c.model.clone()))
            .unwrap_or_default(),
        api_key: api_key
            .map(str::to_string)
            .or_else(|| base.as_ref().map(|c| c.api_key.clone()))
            .unwrap_or_default(),
    };
    settings.api_profiles.retain(|p| p.id != "cli");
    settings.api_profiles.push(profile);
    settings.active_profile = Some("cli".to_string());
}

fn parse_style(raw: &str) -> AnnotationResult<DisplayStyle> {
    match raw {
        "translation-only" => Ok(DisplayStyle::TranslationOnly),
        "original-translation" => Ok(DisplayStyle::OriginalTranslation),
        "translation-original" => Ok(DisplayStyle::TranslationOriginal),
        other => Err(AnnotationError::ConfigError(format!(
            "未知的显示样式: {}",
            other
        ))),
    }
}

async fn read_input(input: &str) -> AnnotationResult<(Vec<u8>, Option<String>)> {
    if input == "-" {
        let mut buffer = Vec::new();
        std::io::stdin().read_to_end(&mut buffer)?;
        return Ok((buffer, None));
    }

    if input.starts_with("http://") || input.starts_with("https://") {
        let url = Url::parse(input)
            .map_err(|e| AnnotationError::ConfigError(format!("无效的URL {}: {}", input, e)))?;
        let hostname = url.host_str().map(str::to_string);
        let response = reqwest::get(url).await.map_err(|e| {
            AnnotationError::ApiError(lexiweave::annotation::ApiFailure::transport(
                input,
                e.to_string(),
            ))
        })?;
        let bytes = response.bytes().await.map_err(|e| {
            AnnotationError::ApiError(lexiweave::annotation::ApiFailure::transport(
                input,
                e.to_string(),
            ))
        })?;
        return Ok((bytes.to_vec(), hostname));
    }

    Ok((std::fs::read(input)?, None))
}

fn write_output(path: Option<&std::path::Path>, data: &[u8]) -> AnnotationResult<()> {
    match path {
        Some(path) => std::fs::write(path, data)?,
        None => std::io::stdout().write_all(data)?,
    }
    Ok(())
}
