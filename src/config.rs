use crate::error::{AppResult, ConfigError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 服务地址 ---
    /// 判题服务地址（提交、状态、结果）
    pub judge_base_url: String,
    /// 阅卷服务地址（试卷加载、交卷）
    pub grading_base_url: String,
    /// 人脸监考服务地址，未配置时不启用
    pub proctor_base_url: Option<String>,
    /// 登录态令牌（可选，附加为 Bearer）
    pub auth_token: Option<String>,
    /// HTTP 请求超时
    pub request_timeout_secs: u64,
    // --- 本地持久化 ---
    pub state_file: String,
    pub log_file: String,
    pub verbose_logging: bool,
    // --- 监考策略 ---
    pub max_tab_switches: u32,
    pub tab_switch_debounce_ms: i64,
    pub proctor_interval_ms: u64,
    // --- 判题轮询 ---
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    /// 代码自动保存的合并窗口
    pub save_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            judge_base_url: "http://localhost:8081/api".to_string(),
            grading_base_url: "http://localhost:8081/api".to_string(),
            proctor_base_url: None,
            auth_token: None,
            request_timeout_secs: 30,
            state_file: "exam_state.json".to_string(),
            log_file: "exam_session.log".to_string(),
            verbose_logging: false,
            max_tab_switches: 5,
            tab_switch_debounce_ms: 3000,
            proctor_interval_ms: 5000,
            poll_interval_ms: 1000,
            poll_max_attempts: 60,
            save_debounce_ms: 500,
        }
    }
}

/// TOML 配置文件，所有字段均可省略
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    judge_base_url: Option<String>,
    grading_base_url: Option<String>,
    proctor_base_url: Option<String>,
    auth_token: Option<String>,
    request_timeout_secs: Option<u64>,
    state_file: Option<String>,
    log_file: Option<String>,
    verbose_logging: Option<bool>,
    max_tab_switches: Option<u32>,
    tab_switch_debounce_ms: Option<i64>,
    proctor_interval_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    poll_max_attempts: Option<u32>,
    save_debounce_ms: Option<u64>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 读取 TOML 配置文件，再叠加环境变量
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(config.with_env_overrides())
    }

    fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: FileConfig = toml::from_str(content)?;
        let default = Self::default();
        Ok(Self {
            judge_base_url: file.judge_base_url.unwrap_or(default.judge_base_url),
            grading_base_url: file.grading_base_url.unwrap_or(default.grading_base_url),
            proctor_base_url: file.proctor_base_url.or(default.proctor_base_url),
            auth_token: file.auth_token.or(default.auth_token),
            request_timeout_secs: file.request_timeout_secs.unwrap_or(default.request_timeout_secs),
            state_file: file.state_file.unwrap_or(default.state_file),
            log_file: file.log_file.unwrap_or(default.log_file),
            verbose_logging: file.verbose_logging.unwrap_or(default.verbose_logging),
            max_tab_switches: file.max_tab_switches.unwrap_or(default.max_tab_switches),
            tab_switch_debounce_ms: file.tab_switch_debounce_ms.unwrap_or(default.tab_switch_debounce_ms),
            proctor_interval_ms: file.proctor_interval_ms.unwrap_or(default.proctor_interval_ms),
            poll_interval_ms: file.poll_interval_ms.unwrap_or(default.poll_interval_ms),
            poll_max_attempts: file.poll_max_attempts.unwrap_or(default.poll_max_attempts),
            save_debounce_ms: file.save_debounce_ms.unwrap_or(default.save_debounce_ms),
        })
    }

    fn with_env_overrides(self) -> Self {
        Self {
            judge_base_url: std::env::var("JUDGE_BASE_URL").unwrap_or(self.judge_base_url),
            grading_base_url: std::env::var("GRADING_BASE_URL").unwrap_or(self.grading_base_url),
            proctor_base_url: std::env::var("PROCTOR_BASE_URL").ok().or(self.proctor_base_url),
            auth_token: std::env::var("AUTH_TOKEN").ok().or(self.auth_token),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.request_timeout_secs),
            state_file: std::env::var("STATE_FILE").unwrap_or(self.state_file),
            log_file: std::env::var("LOG_FILE").unwrap_or(self.log_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(self.verbose_logging),
            max_tab_switches: std::env::var("MAX_TAB_SWITCHES").ok().and_then(|v| v.parse().ok()).unwrap_or(self.max_tab_switches),
            tab_switch_debounce_ms: std::env::var("TAB_SWITCH_DEBOUNCE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.tab_switch_debounce_ms),
            proctor_interval_ms: std::env::var("PROCTOR_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.proctor_interval_ms),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.poll_interval_ms),
            poll_max_attempts: std::env::var("POLL_MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.poll_max_attempts),
            save_debounce_ms: std::env::var("SAVE_DEBOUNCE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.save_debounce_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn proctor_interval(&self) -> Duration {
        Duration::from_millis(self.proctor_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_partial_overrides_defaults() {
        let config = Config::from_toml_str(
            r#"
            judge_base_url = "http://judge:9000/api"
            max_tab_switches = 3
            proctor_base_url = "http://cv:5000"
            "#,
        )
        .unwrap();

        assert_eq!(config.judge_base_url, "http://judge:9000/api");
        assert_eq!(config.max_tab_switches, 3);
        assert_eq!(config.proctor_base_url.as_deref(), Some("http://cv:5000"));
        assert_eq!(config.poll_max_attempts, 60);
        assert_eq!(config.save_debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_toml_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("not/here.toml"));
    }
}
