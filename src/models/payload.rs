//! 交卷载荷与阅卷服务返回的考生记录

use crate::models::submission::TestResult;
use serde::{Deserialize, Serialize};

/// 单个用例在交卷载荷中的精简形式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    /// `passed` / `failed`
    pub status: String,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
}

impl From<&TestResult> for ResultEntry {
    fn from(r: &TestResult) -> Self {
        Self {
            status: if r.passed { "passed" } else { "failed" }.to_string(),
            input: r.input.clone(),
            expected_output: r.expected_output.clone(),
            actual_output: r.actual_output.clone(),
        }
    }
}

/// 单题结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: i64,
    pub attempted: bool,
    pub correct: bool,
    pub attempts: u32,
    /// 最近一次运行的结果摘要，未运行过为空
    #[serde(default)]
    pub output: String,
    pub results: Vec<ResultEntry>,
}

/// 交卷载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSubmitPayload {
    pub name: String,
    pub email: String,
    pub batch: String,
    /// ISO-8601，毫秒精度，UTC
    pub submitted_at: String,
    pub test_id: i64,
    pub question_results: Vec<QuestionResult>,
    pub tab_switch_count: u32,
    pub copy_paste_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_warnings: Option<u32>,
}

/// 阅卷服务确认后的考生记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    /// 其余字段原样保留，供完成页展示
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
