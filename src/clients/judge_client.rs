/// 判题服务客户端
///
/// 封装提交代码、查询状态、拉取用例结果三个调用
use crate::clients::{build_http_client, join_url, read_json};
use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};
use crate::models::{JudgeVerdict, StatusResponse, SubmissionStatus, SubmissionTicket, SubmitRequest};
use async_trait::async_trait;
use tracing::debug;

/// 判题服务能力
#[async_trait]
pub trait JudgeApi: Send + Sync {
    /// 提交代码，返回提交 ID
    async fn submit(&self, test_id: i64, student_id: i64, request: &SubmitRequest) -> AppResult<String>;

    /// 查询提交状态
    async fn status(&self, submission_id: &str) -> AppResult<SubmissionStatus>;

    /// 拉取用例结果，顺序与题目的用例列表一致
    async fn results(&self, submission_id: &str) -> AppResult<Vec<JudgeVerdict>>;
}

/// 判题服务 HTTP 客户端
pub struct JudgeClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl JudgeClient {
    /// 创建新的判题客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            base_url: config.judge_base_url.clone(),
            token: config.auth_token.clone(),
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl JudgeApi for JudgeClient {
    async fn submit(&self, test_id: i64, student_id: i64, request: &SubmitRequest) -> AppResult<String> {
        let endpoint = join_url(&self.base_url, "submissions");
        debug!(
            "提交代码 题目 {} | 语言 {} | 代码长度 {}",
            request.question_id,
            request.language,
            request.source.len()
        );

        let response = self
            .authorize(self.http.post(&endpoint))
            .query(&[("testId", test_id), ("studentId", student_id)])
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        let ticket: SubmissionTicket = read_json(&endpoint, response).await?;
        ticket.resolve_id().ok_or_else(|| {
            AppError::Api(ApiError::MissingField {
                endpoint,
                field: "id".to_string(),
            })
        })
    }

    async fn status(&self, submission_id: &str) -> AppResult<SubmissionStatus> {
        let endpoint = join_url(&self.base_url, &format!("submissions/{}", submission_id));
        let response = self
            .authorize(self.http.get(&endpoint))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        let status: StatusResponse = read_json(&endpoint, response).await?;
        Ok(status.status())
    }

    async fn results(&self, submission_id: &str) -> AppResult<Vec<JudgeVerdict>> {
        let endpoint = join_url(&self.base_url, &format!("submissions/{}/results", submission_id));
        let response = self
            .authorize(self.http.get(&endpoint))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        read_json(&endpoint, response).await
    }
}
