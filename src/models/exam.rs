//! 试卷、考生与会话
//!
//! 会话在挂载时由"试卷 + 考生 + 链接令牌"一次性构造，之后除剩余时间外不可变。

use crate::models::language::Language;
use serde::{Deserialize, Serialize};

/// 测试用例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseDetails {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub input_data: String,
    #[serde(default)]
    pub expected_output: String,
    /// 示例用例会在作答过程中展示详细输入输出
    #[serde(default)]
    pub example_case: bool,
}

/// 题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDetails {
    pub id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub marks: Option<i32>,
    /// 出题人指定的默认语言，未指定时使用 Python
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default)]
    pub test_cases: Vec<TestCaseDetails>,
}

impl QuestionDetails {
    pub fn default_language(&self) -> Language {
        self.language.unwrap_or_default()
    }
}

/// 试卷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDetails {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    /// 考试时长（分钟）
    pub duration: u32,
    #[serde(default)]
    pub questions: Vec<QuestionDetails>,
}

/// 考生
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub batch: String,
}

/// 考试会话
#[derive(Debug, Clone)]
pub struct Session {
    pub test: TestDetails,
    pub student: Student,
    /// 考试链接令牌，交卷时必需
    pub session_token: Option<String>,
    pub duration_seconds: u64,
    /// 挂载时间（毫秒时间戳）
    pub start_epoch_ms: i64,
}

impl Session {
    pub fn new(
        test: TestDetails,
        student: Student,
        session_token: Option<String>,
        start_epoch_ms: i64,
    ) -> Self {
        let duration_seconds = u64::from(test.duration) * 60;
        let session_token = session_token.filter(|t| !t.trim().is_empty());
        Self {
            test,
            student,
            session_token,
            duration_seconds,
            start_epoch_ms,
        }
    }

    pub fn test_id(&self) -> i64 {
        self.test.id
    }

    pub fn student_id(&self) -> i64 {
        self.student.id
    }

    pub fn question_count(&self) -> usize {
        self.test.questions.len()
    }

    pub fn question(&self, index: usize) -> Option<&QuestionDetails> {
        self.test.questions.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_test_details_from_backend_shape() {
        let test: TestDetails = serde_json::from_value(json!({
            "id": 12,
            "title": "Arrays",
            "duration": 60,
            "createdBy": 3,
            "questions": [{
                "id": 100,
                "description": "sum",
                "marks": 10,
                "testCases": [
                    {"id": 1, "inputData": "1 2", "expectedOutput": "3", "exampleCase": true},
                    {"id": 2, "inputData": "2 2", "expectedOutput": "4"}
                ]
            }]
        }))
        .unwrap();

        assert_eq!(test.questions[0].test_cases.len(), 2);
        assert!(test.questions[0].test_cases[0].example_case);
        assert!(!test.questions[0].test_cases[1].example_case);
        assert_eq!(test.questions[0].default_language(), Language::Python);
    }

    #[test]
    fn test_session_duration_and_blank_token() {
        let test = TestDetails {
            id: 1,
            title: String::new(),
            duration: 60,
            questions: vec![],
        };
        let student = Student {
            id: 2,
            name: "a".into(),
            email: "a@b".into(),
            batch: "x".into(),
        };
        let session = Session::new(test, student, Some("  ".into()), 0);
        assert_eq!(session.duration_seconds, 3600);
        assert!(session.session_token.is_none());
    }
}
