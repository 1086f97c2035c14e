//! 日志系统

use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: String,
    /// 日志文件路径
    pub file_path: Option<String>,
    /// 是否启用彩色输出
    pub colored: bool,
    /// 是否显示目标模块
    pub show_target: bool,
    /// 日志轮转配置
    pub rotation: LogRotation,
}

/// 日志轮转配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// 不轮转
    Never,
    /// 每小时轮转
    Hourly,
    /// 每天轮转
    #[default]
    Daily,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            colored: true,
            show_target: false,
            rotation: LogRotation::Daily,
        }
    }
}

/// 解析日志级别，未知值按 info 处理
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// 初始化日志系统
///
/// 返回的 guard 必须在进程生命周期内保持存活，否则文件日志会丢失。
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>, SchedulerError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "xvb_switcher={}",
            parse_level(&config.level).as_str().to_ascii_lowercase()
        ))
    });

    let console_layer = fmt::layer()
        .with_ansi(config.colored)
        .with_target(config.show_target);

    let registry = tracing_subscriber::registry().with(env_filter).with(console_layer);

    let Some(file_path) = config.file_path else {
        registry
            .try_init()
            .map_err(|e| SchedulerError::System(format!("Failed to install logger: {}", e)))?;
        return Ok(None);
    };

    let file_path = Path::new(&file_path);
    let directory = file_path.parent().unwrap_or(Path::new("."));
    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("xvb-switcher.log");

    let (writer, guard) = match config.rotation {
        LogRotation::Never => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|e| SchedulerError::System(format!("Failed to open log file: {}", e)))?;
            non_blocking(file)
        }
        LogRotation::Hourly => non_blocking(rolling::hourly(directory, file_name)),
        LogRotation::Daily => non_blocking(rolling::daily(directory, file_name)),
    };

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .json();

    registry
        .with(file_layer)
        .try_init()
        .map_err(|e| SchedulerError::System(format!("Failed to install logger: {}", e)))?;

    Ok(Some(guard))
}

#[macro_export]
macro_rules! worker_debug {
    ($worker:expr, $($arg:tt)*) => {
        tracing::debug!(target: "xvb_switcher::worker", worker = %$worker, $($arg)*)
    };
}

#[macro_export]
macro_rules! worker_info {
    ($worker:expr, $($arg:tt)*) => {
        tracing::info!(target: "xvb_switcher::worker", worker = %$worker, $($arg)*)
    };
}

#[macro_export]
macro_rules! worker_warn {
    ($worker:expr, $($arg:tt)*) => {
        tracing::warn!(target: "xvb_switcher::worker", worker = %$worker, $($arg)*)
    };
}
