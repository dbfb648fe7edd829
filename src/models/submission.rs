//! 判题提交相关类型
//!
//! 包含发往判题服务的请求、判题服务的原始响应，以及归一化后的用例结果。

use crate::models::exam::TestCaseDetails;
use crate::models::language::Language;
use serde::{Deserialize, Deserializer, Serialize};

/// 判题提交请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub language: Language,
    pub source: String,
    pub filename: String,
    pub stdin: String,
    pub question_id: i64,
    pub student_id: i64,
}

impl SubmitRequest {
    pub fn new(language: Language, source: impl Into<String>, question_id: i64, student_id: i64) -> Self {
        Self {
            language,
            source: source.into(),
            filename: language.filename(),
            stdin: String::new(),
            question_id,
            student_id,
        }
    }
}

/// 提交回执，判题服务可能返回 `id` 或 `submissionId`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionTicket {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub submission_id: Option<String>,
}

impl SubmissionTicket {
    pub fn resolve_id(&self) -> Option<String> {
        self.id
            .clone()
            .or_else(|| self.submission_id.clone())
            .filter(|id| !id.is_empty())
    }
}

/// 提交状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionStatus {
    Pending,
    Running,
    Accepted,
    Rejected,
    Failed,
}

impl SubmissionStatus {
    /// 解析判题服务返回的状态字符串
    ///
    /// `COMPLETED` 只说明判题结束，是否全部通过要等用例结果出来后再细化。
    pub fn from_judge(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" => SubmissionStatus::Pending,
            "RUNNING" => SubmissionStatus::Running,
            "COMPLETED" | "ACCEPTED" | "AC" => SubmissionStatus::Accepted,
            "REJECTED" | "WA" | "CE" | "RTE" | "TLE" => SubmissionStatus::Rejected,
            _ => SubmissionStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending | SubmissionStatus::Running)
    }
}

/// 状态查询响应
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: String,
}

impl StatusResponse {
    pub fn status(&self) -> SubmissionStatus {
        SubmissionStatus::from_judge(&self.status)
    }
}

/// 单个用例的原始判题结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeVerdict {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
}

impl JudgeVerdict {
    pub fn is_accepted(&self) -> bool {
        self.status.eq_ignore_ascii_case("AC")
    }
}

/// 归一化后的用例结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// 用例序号（从 1 开始）
    pub index: usize,
    pub passed: bool,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub stderr: String,
    pub is_example: bool,
}

/// 按位置把判题结果和题目已知用例拼在一起
///
/// 判题结果多于已知用例时，缺失的输入/期望输出记为 `N/A`。
pub fn normalize_verdicts(verdicts: &[JudgeVerdict], cases: &[TestCaseDetails]) -> Vec<TestResult> {
    verdicts
        .iter()
        .enumerate()
        .map(|(idx, v)| {
            let case = cases.get(idx);
            TestResult {
                index: idx + 1,
                passed: v.is_accepted(),
                input: case.map(|c| c.input_data.clone()).unwrap_or_else(|| "N/A".to_string()),
                expected_output: case
                    .map(|c| c.expected_output.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
                actual_output: v.stdout.clone().unwrap_or_default(),
                stderr: v.stderr.clone().unwrap_or_default(),
                is_example: case.map(|c| c.example_case).unwrap_or(false),
            }
        })
        .collect()
}

/// 一次运行的提交记录，只在本次运行期间存在
#[derive(Debug, Clone)]
pub struct Submission {
    pub submission_id: String,
    pub status: SubmissionStatus,
    pub verdicts: Vec<JudgeVerdict>,
}

impl Submission {
    pub fn new(submission_id: String) -> Self {
        Self {
            submission_id,
            status: SubmissionStatus::Pending,
            verdicts: Vec::new(),
        }
    }

    /// 用轮询到的状态推进
    pub fn advance(&mut self, status: SubmissionStatus) {
        self.status = status;
    }

    /// 拿到用例结果后细化终态
    pub fn settle(&mut self, verdicts: Vec<JudgeVerdict>) {
        if self.status == SubmissionStatus::Accepted && !verdicts.iter().all(|v| v.is_accepted()) {
            self.status = SubmissionStatus::Rejected;
        }
        self.verdicts = verdicts;
    }
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer submission id")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(input: &str, output: &str, example: bool) -> TestCaseDetails {
        TestCaseDetails {
            id: None,
            input_data: input.into(),
            expected_output: output.into(),
            example_case: example,
        }
    }

    #[test]
    fn test_ticket_accepts_numeric_or_string_id() {
        let t: SubmissionTicket = serde_json::from_value(json!({"id": 42, "status": "PENDING"})).unwrap();
        assert_eq!(t.resolve_id().as_deref(), Some("42"));

        let t: SubmissionTicket = serde_json::from_value(json!({"submissionId": "abc"})).unwrap();
        assert_eq!(t.resolve_id().as_deref(), Some("abc"));

        let t: SubmissionTicket = serde_json::from_value(json!({"id": null})).unwrap();
        assert_eq!(t.resolve_id(), None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SubmissionStatus::from_judge("PENDING"), SubmissionStatus::Pending);
        assert_eq!(SubmissionStatus::from_judge("running"), SubmissionStatus::Running);
        assert_eq!(SubmissionStatus::from_judge("COMPLETED"), SubmissionStatus::Accepted);
        assert_eq!(SubmissionStatus::from_judge("FAILED"), SubmissionStatus::Failed);
        assert!(!SubmissionStatus::Running.is_terminal());
        assert!(SubmissionStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_normalize_zips_positionally() {
        let verdicts = vec![
            JudgeVerdict {
                status: "AC".into(),
                stdout: Some("3".into()),
                stderr: None,
            },
            JudgeVerdict {
                status: "WA".into(),
                stdout: Some("5".into()),
                stderr: Some("oops".into()),
            },
            JudgeVerdict {
                status: "AC".into(),
                stdout: None,
                stderr: None,
            },
        ];
        let cases = vec![case("1 2", "3", true), case("2 2", "4", false)];

        let results = normalize_verdicts(&verdicts, &cases);
        assert_eq!(results.len(), 3);
        assert!(results[0].passed && results[0].is_example);
        assert_eq!(results[1].expected_output, "4");
        assert_eq!(results[1].stderr, "oops");
        assert!(!results[1].passed);
        assert_eq!(results[2].input, "N/A");
        assert_eq!(results[2].index, 3);
    }

    #[test]
    fn test_settle_downgrades_completed_with_failures() {
        let mut s = Submission::new("1".into());
        s.advance(SubmissionStatus::from_judge("COMPLETED"));
        s.settle(vec![JudgeVerdict {
            status: "WA".into(),
            ..Default::default()
        }]);
        assert_eq!(s.status, SubmissionStatus::Rejected);
    }
}
