//! 题目状态缓存 - 业务能力层
//!
//! 每道题一个 `QuestionState`，第一次访问时惰性创建，之后只覆盖不删除。
//! 代码改动按合并窗口延迟落盘；切题时无论窗口是否到期都会同步落盘。

use crate::error::{AppResult, SessionError};
use crate::infrastructure::{KeyValueStore, StorageKeys};
use crate::models::{Language, QuestionResult, ResultEntry, TestResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 结果面板当前标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultTab {
    #[default]
    TestCase,
    Result,
}

/// 单题状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionState {
    pub language: Language,
    pub source_code: String,
    pub active_result_tab: ResultTab,
    pub last_results: Vec<TestResult>,
    pub console_output: String,
    pub attempted: bool,
    pub all_passed: bool,
    pub attempt_count: u32,
}

impl QuestionState {
    fn fresh(language: Language) -> Self {
        Self {
            language,
            source_code: language.template().to_string(),
            active_result_tab: ResultTab::TestCase,
            last_results: Vec::new(),
            console_output: String::new(),
            attempted: false,
            all_passed: false,
            attempt_count: 0,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.last_results.iter().filter(|r| r.passed).count()
    }
}

/// 局部更新
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionPatch {
    pub source_code: Option<String>,
    pub active_result_tab: Option<ResultTab>,
    pub console_output: Option<String>,
    pub append_console: Option<String>,
}

impl QuestionPatch {
    pub fn source(code: impl Into<String>) -> Self {
        Self {
            source_code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn console(text: impl Into<String>) -> Self {
        Self {
            console_output: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn append(text: impl Into<String>) -> Self {
        Self {
            append_console: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_tab(mut self, tab: ResultTab) -> Self {
        self.active_result_tab = Some(tab);
        self
    }
}

/// 落盘格式：代码 + 语言
#[derive(Debug, Serialize, Deserialize)]
struct SourceSnapshot {
    language: Language,
    source: String,
}

/// 题目状态缓存
pub struct QuestionCache {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
    default_languages: Vec<Language>,
    entries: HashMap<usize, QuestionState>,
    active: usize,
    dirty: BTreeMap<usize, Instant>,
    debounce: Duration,
}

impl QuestionCache {
    /// # 参数
    /// - `default_languages`: 每道题的默认语言，长度即题目数量
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: StorageKeys,
        default_languages: Vec<Language>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            keys,
            default_languages,
            entries: HashMap::new(),
            active: 0,
            dirty: BTreeMap::new(),
            debounce,
        }
    }

    pub fn question_count(&self) -> usize {
        self.default_languages.len()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn state(&self, index: usize) -> Option<&QuestionState> {
        self.entries.get(&index)
    }

    pub fn active_state(&self) -> Option<&QuestionState> {
        self.entries.get(&self.active)
    }

    /// 切换到第 `index` 题
    ///
    /// 先把当前题同步落盘，再加载（或惰性创建）目标题。
    pub fn select(&mut self, index: usize) -> AppResult<&QuestionState> {
        self.check_index(index)?;

        if self.entries.contains_key(&self.active) {
            self.flush(self.active);
        }
        self.active = index;
        self.ensure_loaded(index);

        debug!("切换到第 {} 题", index + 1);
        self.entries
            .get(&index)
            .ok_or_else(|| SessionError::QuestionOutOfRange {
                index,
                max_index: self.question_count().saturating_sub(1),
            }.into())
    }

    /// 合并局部更新；代码变化会在合并窗口后落盘
    pub fn update(&mut self, index: usize, patch: QuestionPatch, now: Instant) -> AppResult<()> {
        self.check_index(index)?;
        self.ensure_loaded(index);
        let debounce = self.debounce;

        let mut source_changed = false;
        if let Some(entry) = self.entries.get_mut(&index) {
            if let Some(code) = patch.source_code {
                source_changed = entry.source_code != code;
                entry.source_code = code;
            }
            if let Some(tab) = patch.active_result_tab {
                entry.active_result_tab = tab;
            }
            if let Some(text) = patch.console_output {
                entry.console_output = text;
            }
            if let Some(text) = patch.append_console {
                entry.console_output.push_str(&text);
            }
        }

        if source_changed {
            self.dirty.insert(index, now + debounce);
        }
        Ok(())
    }

    /// 切换语言，代码重置为该语言模板
    pub fn change_language(&mut self, index: usize, language: Language, now: Instant) -> AppResult<()> {
        self.check_index(index)?;
        self.ensure_loaded(index);
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.language = language;
            entry.source_code = language.template().to_string();
        }
        self.dirty.insert(index, now + self.debounce);
        Ok(())
    }

    /// 代码重置为当前语言模板
    pub fn reset_source(&mut self, index: usize, now: Instant) -> AppResult<()> {
        self.check_index(index)?;
        self.ensure_loaded(index);
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.source_code = entry.language.template().to_string();
        }
        self.dirty.insert(index, now + self.debounce);
        Ok(())
    }

    /// 写入一次成功运行的结果
    pub fn apply_run(&mut self, index: usize, results: Vec<TestResult>) -> AppResult<&QuestionState> {
        self.check_index(index)?;
        self.ensure_loaded(index);
        let entry = self
            .entries
            .get_mut(&index)
            .ok_or(SessionError::QuestionOutOfRange {
                index,
                max_index: self.default_languages.len().saturating_sub(1),
            })?;

        let passed = results.iter().filter(|r| r.passed).count();
        entry.attempted = true;
        entry.all_passed = !results.is_empty() && passed == results.len();
        entry.attempt_count += 1;
        entry.last_results = results;
        entry.active_result_tab = ResultTab::Result;
        Ok(entry)
    }

    /// 最近的落盘截止时间
    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.dirty.values().min().copied()
    }

    /// 落盘所有已到期的改动
    pub fn flush_due(&mut self, now: Instant) {
        let due: Vec<usize> = self
            .dirty
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(index, _)| *index)
            .collect();
        for index in due {
            self.flush(index);
        }
    }

    /// 立即落盘所有改动
    pub fn flush_all(&mut self) {
        let pending: Vec<usize> = self.dirty.keys().copied().collect();
        for index in pending {
            self.flush(index);
        }
    }

    /// 立即落盘第 `index` 题
    pub fn flush(&mut self, index: usize) {
        self.dirty.remove(&index);
        let Some(entry) = self.entries.get(&index) else {
            return;
        };

        let snapshot = SourceSnapshot {
            language: entry.language,
            source: entry.source_code.clone(),
        };
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = self.store.set(&self.keys.question(index), &json) {
                    warn!("⚠️ 第 {} 题代码保存失败: {}", index + 1, e);
                }
            }
            Err(e) => warn!("⚠️ 第 {} 题代码序列化失败: {}", index + 1, e),
        }
    }

    /// 汇总单题结果，用于交卷
    pub fn question_result(&self, index: usize, question_id: i64) -> QuestionResult {
        match self.entries.get(&index) {
            Some(entry) if entry.attempted => QuestionResult {
                question_id,
                attempted: true,
                correct: entry.all_passed,
                attempts: entry.attempt_count,
                output: String::new(),
                results: entry.last_results.iter().map(ResultEntry::from).collect(),
            },
            _ => QuestionResult {
                question_id,
                attempted: false,
                correct: false,
                attempts: 0,
                output: String::new(),
                results: Vec::new(),
            },
        }
    }

    /// 清除所有题目的落盘代码
    pub fn clear_persisted(&mut self) {
        self.dirty.clear();
        for index in 0..self.question_count() {
            if let Err(e) = self.store.remove(&self.keys.question(index)) {
                warn!("⚠️ 清理第 {} 题代码失败: {}", index + 1, e);
            }
        }
    }

    fn check_index(&self, index: usize) -> AppResult<()> {
        if index >= self.question_count() {
            return Err(SessionError::QuestionOutOfRange {
                index,
                max_index: self.question_count().saturating_sub(1),
            }
            .into());
        }
        Ok(())
    }

    fn ensure_loaded(&mut self, index: usize) {
        if self.entries.contains_key(&index) {
            return;
        }
        let default_language = self.default_languages.get(index).copied().unwrap_or_default();
        let mut state = QuestionState::fresh(default_language);

        match self.store.get(&self.keys.question(index)) {
            Ok(Some(raw)) => match serde_json::from_str::<SourceSnapshot>(&raw) {
                Ok(snapshot) => {
                    state.language = snapshot.language;
                    state.source_code = snapshot.source;
                }
                // 早期版本只存了代码文本
                Err(_) => state.source_code = raw,
            },
            Ok(None) => {}
            Err(e) => warn!("⚠️ 读取第 {} 题代码失败，使用默认模板: {}", index + 1, e),
        }

        self.entries.insert(index, state);
    }
}
