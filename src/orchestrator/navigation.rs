//! 交卷后的页面跳转
//!
//! 交卷成功后考生不能再回到答题页：先压入一个占位历史记录，
//! 之后的每次"后退"都被拒绝并重新压入占位，然后跳转到完成页。

use crate::models::{QuestionResult, StudentRecord};
use crate::orchestrator::session::SubmitTrigger;
use std::sync::Mutex;

/// 完成页展示的数据
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionView {
    pub test_title: String,
    /// 阅卷服务确认后的考生记录
    pub student: StudentRecord,
    pub question_results: Vec<QuestionResult>,
    pub tab_switch_count: u32,
    pub copy_paste_attempts: u32,
    pub face_warnings: u32,
    pub trigger: SubmitTrigger,
}

impl CompletionView {
    pub fn attempted_count(&self) -> usize {
        self.question_results.iter().filter(|q| q.attempted).count()
    }

    pub fn correct_count(&self) -> usize {
        self.question_results.iter().filter(|q| q.correct).count()
    }
}

/// 导航能力
pub trait Navigator: Send + Sync {
    /// 压入占位历史记录
    fn push_sentinel(&self);

    /// 跳转到完成页（替换当前页面）
    fn redirect_completion(&self, view: &CompletionView);
}

/// 记录所有导航动作的导航器，无界面运行和测试使用
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    sentinels: Mutex<usize>,
    completion: Mutex<Option<CompletionView>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sentinel_count(&self) -> usize {
        self.sentinels.lock().map(|n| *n).unwrap_or(0)
    }

    pub fn completion(&self) -> Option<CompletionView> {
        self.completion.lock().ok().and_then(|c| c.clone())
    }
}

impl Navigator for RecordingNavigator {
    fn push_sentinel(&self) {
        if let Ok(mut n) = self.sentinels.lock() {
            *n += 1;
        }
    }

    fn redirect_completion(&self, view: &CompletionView) {
        if let Ok(mut c) = self.completion.lock() {
            *c = Some(view.clone());
        }
    }
}
