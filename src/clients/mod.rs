pub mod grading_client;
pub mod judge_client;
pub mod proctor_client;

pub use grading_client::{GradingApi, GradingClient};
pub use judge_client::{JudgeApi, JudgeClient};
pub use proctor_client::{FrameAnalysis, ProctorApi, ProctorClient};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use tracing::debug;

/// 构建带超时的 HTTP 客户端
pub(crate) fn build_http_client(config: &Config) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(AppError::from)
}

/// 拼接服务地址，去掉多余的斜杠
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// 检查状态码并解析 JSON
///
/// 非 2xx 时把响应体原样带进错误，方便考生看到服务端给出的原因。
pub(crate) async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> AppResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::bad_response(endpoint, status.as_u16(), body));
    }

    let text = response
        .text()
        .await
        .map_err(|e| AppError::api_request_failed(endpoint, e))?;
    debug!("{} 响应: {}", endpoint, crate::utils::logging::truncate_text(&text, 200));

    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_trims_slashes() {
        assert_eq!(join_url("http://h/api/", "/submissions"), "http://h/api/submissions");
        assert_eq!(join_url("http://h/api", "submissions/1"), "http://h/api/submissions/1");
    }
}
