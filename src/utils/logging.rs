use crate::error::AppResult;
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；否则默认 `info`，开启详细日志时为 `debug`。
/// 重复调用不会报错（测试中常见）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
/// - `session_label`: 会话标识（试卷 + 考生）
pub fn init_log_file(log_file_path: &str, session_label: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n考试会话日志 {} - {}\n{}\n\n",
        "=".repeat(60),
        session_label,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .map_err(|e| crate::error::AppError::storage_write_failed(log_file_path, e))?;
    Ok(())
}

/// 记录会话启动信息
pub fn log_session_start(session_label: &str, questions: usize, remaining_secs: u64) {
    info!("{}", "=".repeat(60));
    info!("🚀 考试会话启动 {}", session_label);
    info!("📋 题目数量: {}", questions);
    info!("⏱️ 剩余时间: {}", format_time(remaining_secs));
    info!("{}", "=".repeat(60));
}

/// 记录交卷完成信息
pub fn log_session_complete(session_label: &str, attempted: usize, total: usize, tab_switches: u32) {
    info!("\n{}", "=".repeat(60));
    info!("📊 交卷完成 {}", session_label);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ 已作答: {}/{}", attempted, total);
    info!("🚨 切屏次数: {}", tab_switches);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 格式化剩余时间：超过一小时为 `H:MM:SS`，否则 `M:SS`
pub fn format_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
