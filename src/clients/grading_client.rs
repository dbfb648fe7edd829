/// 阅卷服务客户端
///
/// 通过考试链接令牌加载试卷、提交最终答卷
use crate::clients::{build_http_client, join_url, read_json};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{FinalSubmitPayload, StudentRecord, TestDetails};
use async_trait::async_trait;
use tracing::{debug, info};

/// 阅卷服务能力
#[async_trait]
pub trait GradingApi: Send + Sync {
    /// 通过链接令牌加载试卷
    async fn fetch_test(&self, link_token: &str) -> AppResult<TestDetails>;

    /// 提交最终答卷，返回服务端保存的考生记录
    async fn submit_final(&self, link_token: &str, payload: &FinalSubmitPayload) -> AppResult<StudentRecord>;
}

/// 阅卷服务 HTTP 客户端
pub struct GradingClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GradingClient {
    /// 创建新的阅卷客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            base_url: config.grading_base_url.clone(),
            token: config.auth_token.clone(),
        })
    }
}

#[async_trait]
impl GradingApi for GradingClient {
    async fn fetch_test(&self, link_token: &str) -> AppResult<TestDetails> {
        let endpoint = join_url(&self.base_url, &format!("tests/link/{}", link_token));
        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        let test: TestDetails = read_json(&endpoint, response).await?;
        info!("✓ 已加载试卷《{}》，共 {} 题", test.title, test.questions.len());
        Ok(test)
    }

    async fn submit_final(&self, link_token: &str, payload: &FinalSubmitPayload) -> AppResult<StudentRecord> {
        let endpoint = join_url(&self.base_url, &format!("tests/link/{}/submit-code", link_token));
        debug!("交卷 Payload: {}", serde_json::to_string(payload)?);

        let mut builder = self.http.post(&endpoint).json(payload);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        read_json(&endpoint, response).await
    }
}
