/// 人脸监考服务客户端
///
/// 只负责把一帧画面交给视觉服务并取回判定，不做任何计数
use crate::clients::{build_http_client, join_url, read_json};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// 单帧分析结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FrameAnalysis {
    #[serde(default)]
    pub success: bool,
    /// `ok` / `no_face` / `face_moved` / `looking_away` / `unauthorized_object` ...
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl FrameAnalysis {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// 人脸监考能力
#[async_trait]
pub trait ProctorApi: Send + Sync {
    async fn start(&self) -> AppResult<()>;
    async fn stop(&self) -> AppResult<()>;
    /// 分析一帧（base64 编码的图像）
    async fn process_frame(&self, frame: &str) -> AppResult<FrameAnalysis>;
}

/// 人脸监考 HTTP 客户端
pub struct ProctorClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProctorClient {
    pub fn new(config: &Config, base_url: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            base_url: base_url.into(),
        })
    }

    async fn post_empty(&self, path: &str) -> AppResult<()> {
        let endpoint = join_url(&self.base_url, path);
        let response = self
            .http
            .post(&endpoint)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;
        let _: serde_json::Value = read_json(&endpoint, response).await?;
        Ok(())
    }
}

#[async_trait]
impl ProctorApi for ProctorClient {
    async fn start(&self) -> AppResult<()> {
        self.post_empty("start-proctoring").await
    }

    async fn stop(&self) -> AppResult<()> {
        self.post_empty("stop-proctoring").await
    }

    async fn process_frame(&self, frame: &str) -> AppResult<FrameAnalysis> {
        let endpoint = join_url(&self.base_url, "process-frame");
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({ "frame": frame }))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        read_json(&endpoint, response).await
    }
}
