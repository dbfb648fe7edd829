//! 会话上下文
//!
//! 封装"这是哪张试卷、哪位考生"这一信息，主要用于日志前缀

use crate::infrastructure::StorageKeys;
use crate::models::Session;
use std::fmt::Display;

/// 会话上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCtx {
    /// 试卷ID
    pub test_id: i64,

    /// 考生ID
    pub student_id: i64,

    /// 试卷标题（仅用于日志显示）
    pub title: String,
}

impl SessionCtx {
    pub fn new(test_id: i64, student_id: i64, title: impl Into<String>) -> Self {
        Self {
            test_id,
            student_id,
            title: title.into(),
        }
    }

    pub fn from_session(session: &Session) -> Self {
        Self::new(session.test_id(), session.student_id(), session.test.title.as_str())
    }

    /// 本会话所有落盘键的生成器
    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys::new(self.test_id, self.student_id)
    }
}

impl Display for SessionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[试卷 #{} 考生 #{}]", self.test_id, self.student_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_label() {
        let ctx = SessionCtx::new(12, 34, "Midterm");
        assert_eq!(ctx.to_string(), "[试卷 #12 考生 #34]");
        assert_eq!(ctx.storage_keys().timer(), "test-12-student-34-timer");
    }
}
