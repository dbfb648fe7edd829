use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// API 调用错误（判题 / 阅卷 / 监考服务）
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 本地持久化错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 会话流程错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 错误分级，决定错误如何在会话中传播
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 网络失败等，可重试，状态不受影响
    Recoverable,
    /// 判题轮询超时，题目视为未作答
    Degraded,
    /// 时间耗尽或违规超限，必须强制交卷
    TerminalForced,
    /// 缺少会话令牌等前置条件，禁止进入交卷流程
    FatalPrecondition,
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回非成功状态码
    #[error("API返回错误响应 ({endpoint}): status={status}, body={body}")]
    BadResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// 响应缺少必要字段
    #[error("API响应缺少字段 `{field}` ({endpoint})")]
    MissingField { endpoint: String, field: String },
    /// JSON 解析失败
    #[error("JSON解析失败: {source}")]
    JsonParseFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 本地持久化错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("读取存储失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("写入存储失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("存储锁已损坏")]
    Poisoned,
}

/// 会话流程错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 缺少考试链接令牌，无法交卷
    #[error("考试访问令牌缺失，无法提交试卷")]
    MissingAccessToken,
    /// 同一题目已有运行中的提交
    #[error("第 {question} 题已有代码正在运行")]
    RunInProgress { question: usize },
    /// 判题轮询超出上限
    #[error("判题结果等待超时 (已轮询 {attempts} 次)")]
    JudgeTimeout { attempts: u32 },
    /// 题目索引越界
    #[error("题目索引 {index} 超出范围 [0, {max_index}]")]
    QuestionOutOfRange { index: usize, max_index: usize },
    /// 当前状态不允许该操作
    #[error("当前状态 {phase} 不允许操作: {action}")]
    InvalidPhase { phase: String, action: String },
    /// 试卷没有任何题目
    #[error("试卷没有题目")]
    EmptyTest,
    /// 会话已被强制交卷（时间耗尽或违规超限）
    #[error("会话已强制交卷: {cause}")]
    Forced { cause: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("解析配置文件失败 ({path}): {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        AppError::Api(ApiError::RequestFailed {
            endpoint,
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(StorageError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建API请求失败错误
    pub fn api_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建API错误响应
    pub fn bad_response(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        AppError::Api(ApiError::BadResponse {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        })
    }

    /// 创建存储写入错误
    pub fn storage_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 错误分级
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Session(SessionError::MissingAccessToken) => ErrorKind::FatalPrecondition,
            AppError::Session(SessionError::JudgeTimeout { .. }) => ErrorKind::Degraded,
            AppError::Session(SessionError::Forced { .. }) => ErrorKind::TerminalForced,
            _ => ErrorKind::Recoverable,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            AppError::from(SessionError::MissingAccessToken).kind(),
            ErrorKind::FatalPrecondition
        );
        assert_eq!(
            AppError::from(SessionError::JudgeTimeout { attempts: 60 }).kind(),
            ErrorKind::Degraded
        );
        assert_eq!(
            AppError::bad_response("/submissions", 502, "bad gateway").kind(),
            ErrorKind::Recoverable
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = AppError::bad_response("/tests/link/abc/submit-code", 400, "");
        let msg = err.to_string();
        assert!(msg.contains("/tests/link/abc/submit-code"));
        assert!(msg.contains("400"));
    }
}
