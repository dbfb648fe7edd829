//! 考试会话编排 - 编排层
//!
//! ## 职责
//!
//! 持有一场考试的全部状态：倒计时、违规计数、题目缓存，以及唯一的交卷路径。
//! 本模块是纯状态机，不做任何渲染；界面只负责派发命令、展示快照和提示。
//!
//! ## 状态流转
//!
//! ```text
//! Active ⇄ Confirming → Submitting → Submitted
//!                            ↓
//!                       FailedRetry → Submitting (重试)
//!                            ↓ (仅手动交卷可取消)
//!                          Active
//! ```
//!
//! 手动确认、时间耗尽、切屏超限三种触发方式最终都走 `final_submit`，
//! 同一时间最多只有一次交卷请求在进行。

use crate::clients::{GradingApi, JudgeApi};
use crate::config::Config;
use crate::error::{AppError, AppResult, ErrorKind, SessionError};
use crate::infrastructure::{Clock, KeyValueStore, PollPolicy, ProctorEvent, StorageKeys};
use crate::models::{FinalSubmitPayload, Language, Session, StudentRecord};
use crate::orchestrator::navigation::{CompletionView, Navigator};
use crate::services::{
    DurableTimer, FaceNotice, FaceProctor, MonitorSignal, QuestionCache, QuestionPatch,
    ResultTab, RunOutcome, RunRequest, SubmissionPipeline, TimerTick, TimerUrgency,
    ViolationMonitor,
};
use crate::utils::logging;
use crate::workflow::{console, SessionCtx};
use chrono::{Local, SecondsFormat, TimeZone, Utc};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// 答题中
    Active,
    /// 交卷确认框已打开，计时和监控照常进行
    Confirming,
    /// 交卷请求进行中
    Submitting,
    /// 交卷成功（终态）
    Submitted,
    /// 交卷失败，等待重试
    FailedRetry,
}

impl Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Active => "Active",
            SessionPhase::Confirming => "Confirming",
            SessionPhase::Submitting => "Submitting",
            SessionPhase::Submitted => "Submitted",
            SessionPhase::FailedRetry => "FailedRetry",
        };
        f.write_str(name)
    }
}

/// 交卷触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    TimerExpired,
    ViolationLimit { count: u32 },
}

impl SubmitTrigger {
    /// 系统强制交卷（非考生主动确认）
    pub fn is_forced(&self) -> bool {
        !matches!(self, SubmitTrigger::Manual)
    }

    pub fn describe(&self) -> String {
        match self {
            SubmitTrigger::Manual => "考生主动交卷".to_string(),
            SubmitTrigger::TimerExpired => "考试时间已到".to_string(),
            SubmitTrigger::ViolationLimit { count } => format!("切屏次数达到上限 ({} 次)", count),
        }
    }
}

/// `final_submit` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// 已有交卷在进行或已完成，本次请求被忽略
    Ignored,
    Submitted,
}

/// 一个监考事件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventResponse {
    /// 事件源需要阻止默认行为
    pub suppress_default: bool,
    /// 需要立即执行的强制交卷
    pub trigger: Option<SubmitTrigger>,
}

/// 界面渲染用的会话快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub active_index: usize,
    pub question_count: usize,
    pub attempted_count: usize,
    pub language: Option<Language>,
    pub remaining_seconds: u64,
    pub time_label: String,
    pub urgency: TimerUrgency,
    pub hurry: bool,
    pub tab_switch_count: u32,
    pub max_tab_switches: u32,
    pub copy_paste_attempts: u32,
    pub face_warnings: u32,
    pub run_in_progress: bool,
}

/// 会话向界面发出的提示
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// 第 `question` 题（从 1 开始）的控制台新增文字
    Console { question: usize, text: String },
    Warning(MonitorSignal),
    RunFinished { question: usize, passed: usize, total: usize },
    RunFailed { question: usize, kind: ErrorKind, message: String },
    ConfirmRequested { attempted: usize, total: usize },
    ForcedSubmit { cause: String },
    SubmitFailed { message: String },
    Submitted(CompletionView),
    /// 命令被拒绝（阶段不允许、令牌缺失等）
    Rejected { message: String },
    Status(SessionSnapshot),
}

/// 会话依赖的外部能力
pub struct SessionDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub judge: Arc<dyn JudgeApi>,
    pub grading: Arc<dyn GradingApi>,
    pub navigator: Arc<dyn Navigator>,
}

/// 考试会话编排器
pub struct SessionOrchestrator {
    ctx: SessionCtx,
    session: Session,
    keys: StorageKeys,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    timer: DurableTimer,
    monitor: ViolationMonitor,
    cache: QuestionCache,
    pipeline: Arc<SubmissionPipeline>,
    grading: Arc<dyn GradingApi>,
    navigator: Arc<dyn Navigator>,
    proctor: Option<FaceProctor>,
    proctored: bool,
    phase: SessionPhase,
    trigger: Option<SubmitTrigger>,
    auto_run_done: bool,
    /// 交卷前接管过的运行（提交号），驱动循环稍后送回同一结果时不再重复写入
    taken_over: Option<String>,
    mounted: bool,
    completion: Option<CompletionView>,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl SessionOrchestrator {
    /// 创建会话（尚未挂载）
    ///
    /// # 返回
    /// 编排器和提示接收端；试卷没有题目时返回 `SessionError::EmptyTest`
    pub fn new(
        session: Session,
        config: &Config,
        deps: SessionDeps,
    ) -> AppResult<(Self, mpsc::UnboundedReceiver<SessionNotice>)> {
        if session.question_count() == 0 {
            return Err(SessionError::EmptyTest.into());
        }

        let ctx = SessionCtx::from_session(&session);
        let keys = ctx.storage_keys();
        let timer = DurableTimer::new(deps.store.clone(), deps.clock.clone(), keys.timer());
        let monitor = ViolationMonitor::new(deps.store.clone(), deps.clock.clone(), keys.violations())
            .with_limits(config.max_tab_switches, config.tab_switch_debounce_ms);
        let languages = session
            .test
            .questions
            .iter()
            .map(|q| q.default_language())
            .collect();
        let cache = QuestionCache::new(
            deps.store.clone(),
            keys.clone(),
            languages,
            config.save_debounce(),
        );
        let pipeline = Arc::new(SubmissionPipeline::new(
            deps.judge,
            PollPolicy::new(config.poll_interval(), config.poll_max_attempts),
        ));
        let (tx, rx) = mpsc::unbounded_channel();

        let orchestrator = Self {
            ctx,
            session,
            keys,
            store: deps.store,
            clock: deps.clock,
            timer,
            monitor,
            cache,
            pipeline,
            grading: deps.grading,
            navigator: deps.navigator,
            proctor: None,
            proctored: false,
            phase: SessionPhase::Active,
            trigger: None,
            auto_run_done: false,
            taken_over: None,
            mounted: false,
            completion: None,
            notices: tx,
        };
        Ok((orchestrator, rx))
    }

    /// 挂载会话：恢复计时与违规计数，打开第一题
    ///
    /// # 返回
    /// 恢复出的状态已经要求强制交卷时（时间已耗尽、切屏已超限）返回触发原因，
    /// 调用方应立即执行 `final_submit`
    pub fn mount(&mut self) -> AppResult<Option<SubmitTrigger>> {
        if self.mounted {
            return Ok(None);
        }
        self.mounted = true;

        if self.session.session_token.is_none() {
            warn!("{} ⚠️ 缺少考试访问令牌，本场考试将无法交卷", self.ctx);
        }

        self.cache.select(0)?;

        let mut pending = None;
        if self.timer.start(self.session.duration_seconds) == TimerTick::Expired {
            pending = Some(SubmitTrigger::TimerExpired);
        }
        if self.monitor.start() {
            let count = self.monitor.log().tab_switch_count;
            pending.get_or_insert(SubmitTrigger::ViolationLimit { count });
        }

        logging::log_session_start(
            &self.ctx.to_string(),
            self.session.question_count(),
            self.timer.remaining(),
        );
        Ok(pending)
    }

    /// 接入人脸监考循环
    pub fn attach_proctor(&mut self, proctor: FaceProctor) {
        self.proctor = Some(proctor);
        self.proctored = true;
    }

    /// 摄像头或视觉服务不可用，会话降级为无人脸监考
    pub fn report_proctoring_unavailable(&mut self, err: &AppError) {
        warn!("{} ⚠️ 人脸监考未能开启: {}", self.ctx, err);
        let index = self.cache.active_index();
        self.console_append(index, console::proctoring_unavailable());
    }

    pub fn ctx(&self) -> &SessionCtx {
        &self.ctx
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn trigger(&self) -> Option<SubmitTrigger> {
        self.trigger
    }

    pub fn cache(&self) -> &QuestionCache {
        &self.cache
    }

    pub fn timer(&self) -> &DurableTimer {
        &self.timer
    }

    pub fn monitor(&self) -> &ViolationMonitor {
        &self.monitor
    }

    /// 人脸监考采样循环是否在运行
    pub fn face_proctoring_active(&self) -> bool {
        self.proctor.as_ref().is_some_and(|p| p.is_running())
    }

    pub fn pipeline(&self) -> Arc<SubmissionPipeline> {
        self.pipeline.clone()
    }

    pub fn completion(&self) -> Option<&CompletionView> {
        self.completion.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let active = self.cache.active_index();
        let log = self.monitor.log();
        SessionSnapshot {
            phase: self.phase,
            active_index: active,
            question_count: self.session.question_count(),
            attempted_count: self.attempted_count(),
            language: self.cache.active_state().map(|s| s.language),
            remaining_seconds: self.timer.remaining(),
            time_label: logging::format_time(self.timer.remaining()),
            urgency: self.timer.urgency(),
            hurry: self.timer.is_hurry(),
            tab_switch_count: log.tab_switch_count,
            max_tab_switches: self.monitor.max_tab_switches(),
            copy_paste_attempts: log.copy_paste_attempts,
            face_warnings: log.face_warnings,
            run_in_progress: self.pipeline.is_running(active),
        }
    }

    /// 把当前快照作为提示发出
    pub fn publish_status(&self) {
        self.notify(SessionNotice::Status(self.snapshot()));
    }

    /// 命令被拒绝时通知界面，会话不受影响
    pub fn reject(&self, err: &AppError) {
        warn!("{} ⚠️ 命令被拒绝: {}", self.ctx, err);
        self.notify(SessionNotice::Rejected {
            message: err.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // 答题命令
    // ------------------------------------------------------------------

    /// 切换题目
    pub fn select_question(&mut self, index: usize) -> AppResult<()> {
        self.ensure_phase(&[SessionPhase::Active], "切换题目")?;
        self.cache.select(index)?;
        Ok(())
    }

    /// 编辑当前题代码
    pub fn edit_source(&mut self, source: impl Into<String>, now: Instant) -> AppResult<()> {
        self.ensure_phase(&[SessionPhase::Active], "编辑代码")?;
        let index = self.cache.active_index();
        self.cache.update(index, QuestionPatch::source(source), now)
    }

    /// 切换当前题语言（代码重置为模板）
    pub fn change_language(&mut self, language: Language, now: Instant) -> AppResult<()> {
        self.ensure_phase(&[SessionPhase::Active], "切换语言")?;
        let index = self.cache.active_index();
        self.cache.change_language(index, language, now)?;
        info!("{} 第 {} 题切换为 {}", self.ctx, index + 1, language);
        Ok(())
    }

    /// 当前题代码重置为模板
    pub fn reset_source(&mut self, now: Instant) -> AppResult<()> {
        self.ensure_phase(&[SessionPhase::Active], "重置代码")?;
        let index = self.cache.active_index();
        self.cache.reset_source(index, now)
    }

    /// 准备运行当前题
    ///
    /// 返回的请求交给 `SubmissionPipeline::run`，结果再交回 `apply_run_outcome`。
    pub fn prepare_run(&mut self) -> AppResult<RunRequest> {
        self.ensure_phase(&[SessionPhase::Active], "运行代码")?;
        let index = self.cache.active_index();
        if self.pipeline.is_running(index) {
            return Err(SessionError::RunInProgress { question: index + 1 }.into());
        }

        let request = self.run_request(index)?;
        self.console_set(index, console::running(index + 1));
        Ok(request)
    }

    /// 写回一次运行的结果
    ///
    /// 交卷流程开始后到达的结果直接丢弃。失败原样返回，控制台已写入错误说明。
    pub fn apply_run_outcome(&mut self, index: usize, result: AppResult<RunOutcome>) -> AppResult<()> {
        if !matches!(self.phase, SessionPhase::Active | SessionPhase::Confirming) {
            debug!("{} 会话处于 {}，丢弃第 {} 题的运行结果", self.ctx, self.phase, index + 1);
            return Ok(());
        }

        match result {
            Ok(outcome) if self.taken_over.as_deref() == Some(outcome.submission_id.as_str()) => {
                debug!("{} 第 {} 题的运行结果已在交卷时写入", self.ctx, index + 1);
                Ok(())
            }
            Ok(outcome) => {
                let summary = console::run_summary(&outcome.results);
                let (passed, total) = (outcome.passed(), outcome.total());
                self.cache.apply_run(index, outcome.results)?;
                self.console_set(index, summary);
                self.notify(SessionNotice::RunFinished {
                    question: index + 1,
                    passed,
                    total,
                });
                Ok(())
            }
            Err(e) => {
                warn!("{} ⚠️ 第 {} 题运行失败: {}", self.ctx, index + 1, e);
                self.console_set(index, console::run_error(&e));
                self.notify(SessionNotice::RunFailed {
                    question: index + 1,
                    kind: e.kind(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// 运行当前题并等待结果
    pub async fn run_active(&mut self) -> AppResult<()> {
        let request = self.prepare_run()?;
        let index = request.question_index;
        let pipeline = self.pipeline.clone();
        let result = pipeline.run(request).await;
        self.apply_run_outcome(index, result)
    }

    // ------------------------------------------------------------------
    // 计时与监考
    // ------------------------------------------------------------------

    /// 每秒调用一次
    ///
    /// # 返回
    /// 时间耗尽时返回 `TimerExpired`，整个会话只会返回一次
    pub fn on_tick(&mut self) -> Option<SubmitTrigger> {
        if !matches!(self.phase, SessionPhase::Active | SessionPhase::Confirming) {
            return None;
        }
        match self.timer.tick() {
            TimerTick::Expired => Some(SubmitTrigger::TimerExpired),
            TimerTick::Running(_) | TimerTick::Stopped => None,
        }
    }

    /// 处理一个监考事件
    pub fn on_event(&mut self, event: ProctorEvent) -> EventResponse {
        let outcome = self.monitor.handle(event);
        let mut response = EventResponse {
            suppress_default: outcome.suppress_default,
            trigger: None,
        };

        if let Some(signal) = outcome.signal {
            if let MonitorSignal::ForceSubmit { count } = signal {
                response.trigger = Some(SubmitTrigger::ViolationLimit { count });
            }
            self.surface_signal(signal);
        }
        response
    }

    /// 处理一次人脸异常提醒（不会触发强制交卷）
    pub fn on_face_notice(&mut self, notice: FaceNotice) {
        if !matches!(self.phase, SessionPhase::Active | SessionPhase::Confirming) {
            return;
        }
        if let Some(signal) = self.monitor.record_face_warning(&notice.status) {
            self.surface_signal(signal);
        }
    }

    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.cache.next_flush_deadline()
    }

    pub fn flush_due(&mut self, now: Instant) {
        self.cache.flush_due(now);
    }

    // ------------------------------------------------------------------
    // 交卷
    // ------------------------------------------------------------------

    /// 打开交卷确认框
    pub fn request_submit(&mut self) -> AppResult<()> {
        match self.phase {
            SessionPhase::Active => {
                self.phase = SessionPhase::Confirming;
                self.notify(SessionNotice::ConfirmRequested {
                    attempted: self.attempted_count(),
                    total: self.session.question_count(),
                });
                Ok(())
            }
            _ => {
                debug!("{} 会话处于 {}，忽略交卷请求", self.ctx, self.phase);
                Ok(())
            }
        }
    }

    /// 关闭交卷确认框，回到答题
    ///
    /// 交卷失败后关闭时重新启动计时、违规监控和人脸监考；强制交卷失败后只能重试，不能取消。
    ///
    /// # 返回
    /// 交卷失败期间考试时间已耗尽时返回 `TimerExpired`，调用方应立即执行 `final_submit`
    pub async fn cancel_submit(&mut self) -> AppResult<Option<SubmitTrigger>> {
        match self.phase {
            SessionPhase::Confirming => {
                self.phase = SessionPhase::Active;
                Ok(None)
            }
            SessionPhase::FailedRetry => match self.trigger {
                Some(trigger) if trigger.is_forced() => Err(SessionError::Forced {
                    cause: trigger.describe(),
                }
                .into()),
                _ => Ok(self.rearm().await),
            },
            phase => Err(self.invalid_phase(phase, "取消交卷")),
        }
    }

    async fn rearm(&mut self) -> Option<SubmitTrigger> {
        self.trigger = None;
        self.phase = SessionPhase::Active;
        self.monitor.resume();

        let restarted = match self.proctor.as_mut() {
            Some(proctor) => proctor.restart().await,
            None => Ok(()),
        };
        if let Err(e) = restarted {
            self.report_proctoring_unavailable(&e);
        }

        info!("{} 取消交卷，继续答题", self.ctx);
        match self.timer.resume() {
            TimerTick::Expired => Some(SubmitTrigger::TimerExpired),
            TimerTick::Running(_) | TimerTick::Stopped => None,
        }
    }

    /// 确认交卷
    pub async fn confirm_submit(&mut self) -> AppResult<SubmitStatus> {
        match self.phase {
            SessionPhase::Confirming | SessionPhase::FailedRetry => {
                self.final_submit(SubmitTrigger::Manual).await
            }
            SessionPhase::Submitting | SessionPhase::Submitted => Ok(SubmitStatus::Ignored),
            phase => Err(self.invalid_phase(phase, "确认交卷")),
        }
    }

    /// 唯一的交卷路径
    ///
    /// 1. 校验访问令牌（缺失时不进入交卷流程）
    /// 2. 停止计时、违规监控和人脸监考
    /// 3. 当前题从未运行过时自动运行一次
    /// 4. 汇总载荷并提交阅卷服务
    /// 5. 成功：清理落盘状态，阻止后退，跳转完成页；失败：进入 `FailedRetry`
    pub async fn final_submit(&mut self, trigger: SubmitTrigger) -> AppResult<SubmitStatus> {
        if matches!(self.phase, SessionPhase::Submitting | SessionPhase::Submitted) {
            debug!("{} 交卷已在进行或已完成，忽略 ({})", self.ctx, trigger.describe());
            return Ok(SubmitStatus::Ignored);
        }

        // 强制交卷失败后的重试仍按强制交卷处理
        let trigger = match self.trigger {
            Some(previous) if previous.is_forced() => previous,
            _ => trigger,
        };

        let Some(token) = self.session.session_token.clone() else {
            let err = AppError::from(SessionError::MissingAccessToken);
            error!("{} ❌ {}", self.ctx, err);
            self.notify(SessionNotice::Rejected {
                message: err.to_string(),
            });
            if trigger.is_forced() {
                // 时间或切屏已到上限：停止作答，只保留重试
                self.trigger = Some(trigger);
                self.phase = SessionPhase::FailedRetry;
                self.timer.stop();
                self.monitor.stop();
                if let Some(proctor) = self.proctor.as_mut() {
                    proctor.shutdown().await;
                }
                warn!("{} 🚨 {}，等待令牌恢复后重试交卷", self.ctx, trigger.describe());
            }
            return Err(err);
        };

        self.phase = SessionPhase::Submitting;
        self.trigger = Some(trigger);
        self.timer.stop();
        self.monitor.stop();
        if let Some(proctor) = self.proctor.as_mut() {
            proctor.shutdown().await;
        }

        let index = self.cache.active_index();
        match trigger {
            SubmitTrigger::Manual => {}
            SubmitTrigger::TimerExpired => self.console_append(index, console::time_up()),
            SubmitTrigger::ViolationLimit { count } => {
                self.console_append(index, console::violation_limit(count))
            }
        }
        if trigger.is_forced() {
            warn!("{} 🚨 强制交卷: {}", self.ctx, trigger.describe());
            self.notify(SessionNotice::ForcedSubmit {
                cause: trigger.describe(),
            });
        }

        self.cache.flush_all();
        self.auto_run_active().await;

        let payload = self.build_payload();
        info!(
            "{} 📤 正在提交试卷 ({}/{} 题已作答，切屏 {} 次，剪贴板 {} 次)",
            self.ctx,
            self.attempted_count(),
            self.session.question_count(),
            payload.tab_switch_count,
            payload.copy_paste_attempts
        );

        match self.grading.submit_final(&token, &payload).await {
            Ok(record) => {
                self.complete(record, payload, trigger);
                Ok(SubmitStatus::Submitted)
            }
            Err(e) => {
                error!("{} ❌ 交卷失败: {}", self.ctx, e);
                self.phase = SessionPhase::FailedRetry;
                self.console_append(index, console::submit_failed(&e));
                self.notify(SessionNotice::SubmitFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// 后退导航
    ///
    /// # 返回
    /// 是否允许后退；交卷后一律拒绝并重新压入占位记录
    pub fn on_back_navigation(&self) -> bool {
        if self.phase == SessionPhase::Submitted {
            self.navigator.push_sentinel();
            return false;
        }
        true
    }

    /// 汇总交卷载荷；每次调用都从当前题目状态重新计算
    pub fn build_payload(&self) -> FinalSubmitPayload {
        let student = &self.session.student;
        let log = self.monitor.log();
        let question_results = self
            .session
            .test
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let mut result = self.cache.question_result(i, q.id);
                if let Some(state) = self.cache.state(i).filter(|s| s.attempted) {
                    result.output = console::run_summary(&state.last_results);
                }
                result
            })
            .collect();

        FinalSubmitPayload {
            name: student.name.clone(),
            email: student.email.clone(),
            batch: student.batch.clone(),
            submitted_at: self.submitted_at(),
            test_id: self.session.test_id(),
            question_results,
            tab_switch_count: log.tab_switch_count,
            copy_paste_attempts: log.copy_paste_attempts,
            face_warnings: self.proctored.then_some(log.face_warnings),
        }
    }

    async fn auto_run_active(&mut self) {
        let index = self.cache.active_index();
        let attempted = self.cache.active_state().is_some_and(|s| s.attempted);
        if self.auto_run_done || attempted {
            return;
        }
        self.auto_run_done = true;

        let pipeline = self.pipeline.clone();
        if pipeline.is_running(index) {
            info!("{} 🔄 第 {} 题正在运行，等待结果后交卷", self.ctx, index + 1);
        }
        let result = match pipeline.join(index).await {
            Some(result) => {
                if let Ok(outcome) = &result {
                    self.taken_over = Some(outcome.submission_id.clone());
                }
                result
            }
            None => {
                let request = match self.run_request(index) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("{} ⚠️ 无法构造第 {} 题的自动运行: {}", self.ctx, index + 1, e);
                        return;
                    }
                };
                info!("{} 🔄 第 {} 题尚未运行，交卷前自动运行一次", self.ctx, index + 1);
                pipeline.run(request).await
            }
        };

        match result {
            Ok(outcome) => {
                let (passed, total) = (outcome.passed(), outcome.total());
                let applied = self.cache.apply_run(index, outcome.results).map(|_| ());
                match applied {
                    Ok(()) => self.console_append(index, console::auto_run_summary(index + 1, passed, total)),
                    Err(e) => warn!("{} ⚠️ 自动运行结果写入失败: {}", self.ctx, e),
                }
            }
            Err(e) => {
                warn!("{} ⚠️ 第 {} 题自动运行失败: {}", self.ctx, index + 1, e);
                self.console_append(index, console::auto_run_failed(index + 1));
            }
        }
    }

    fn complete(&mut self, record: StudentRecord, payload: FinalSubmitPayload, trigger: SubmitTrigger) {
        self.cache.clear_persisted();
        for key in [self.keys.timer(), self.keys.violations()] {
            if let Err(e) = self.store.remove(&key) {
                warn!("{} ⚠️ 清理落盘状态失败 ({}): {}", self.ctx, key, e);
            }
        }

        self.phase = SessionPhase::Submitted;
        let index = self.cache.active_index();
        self.console_append(index, console::submit_success());

        let view = CompletionView {
            test_title: self.session.test.title.clone(),
            student: record,
            question_results: payload.question_results,
            tab_switch_count: payload.tab_switch_count,
            copy_paste_attempts: payload.copy_paste_attempts,
            face_warnings: payload.face_warnings.unwrap_or(0),
            trigger,
        };

        self.navigator.push_sentinel();
        self.navigator.redirect_completion(&view);
        logging::log_session_complete(
            &self.ctx.to_string(),
            view.attempted_count(),
            view.question_results.len(),
            view.tab_switch_count,
        );
        self.notify(SessionNotice::Submitted(view.clone()));
        self.completion = Some(view);
    }

    fn run_request(&self, index: usize) -> AppResult<RunRequest> {
        let question = self
            .session
            .question(index)
            .cloned()
            .ok_or(SessionError::QuestionOutOfRange {
                index,
                max_index: self.session.question_count().saturating_sub(1),
            })?;
        let state = self.cache.state(index).ok_or(SessionError::QuestionOutOfRange {
            index,
            max_index: self.session.question_count().saturating_sub(1),
        })?;

        Ok(RunRequest {
            question_index: index,
            question,
            language: state.language,
            source: state.source_code.clone(),
            test_id: self.session.test_id(),
            student_id: self.session.student_id(),
        })
    }

    fn surface_signal(&mut self, signal: MonitorSignal) {
        let index = self.cache.active_index();
        let text = console::monitor_warning(&signal, &self.clock_label());
        self.console_append(index, text);
        self.notify(SessionNotice::Warning(signal));
    }

    fn console_set(&mut self, index: usize, text: String) {
        let patch = QuestionPatch::console(text.clone()).with_tab(ResultTab::Result);
        if let Err(e) = self.cache.update(index, patch, Instant::now()) {
            debug!("控制台写入失败: {}", e);
        }
        self.notify(SessionNotice::Console {
            question: index + 1,
            text,
        });
    }

    fn console_append(&mut self, index: usize, text: String) {
        if let Err(e) = self.cache.update(index, QuestionPatch::append(text.clone()), Instant::now()) {
            debug!("控制台写入失败: {}", e);
        }
        self.notify(SessionNotice::Console {
            question: index + 1,
            text,
        });
    }

    fn notify(&self, notice: SessionNotice) {
        // 接收端关闭说明界面已退出，提示可以丢弃
        let _ = self.notices.send(notice);
    }

    fn attempted_count(&self) -> usize {
        (0..self.session.question_count())
            .filter(|i| self.cache.state(*i).is_some_and(|s| s.attempted))
            .count()
    }

    fn submitted_at(&self) -> String {
        Utc.timestamp_millis_opt(self.clock.now_ms())
            .single()
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn clock_label(&self) -> String {
        Utc.timestamp_millis_opt(self.clock.now_ms())
            .single()
            .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_default()
    }

    fn ensure_phase(&self, allowed: &[SessionPhase], action: &str) -> AppResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(self.invalid_phase(self.phase, action))
        }
    }

    fn invalid_phase(&self, phase: SessionPhase, action: &str) -> AppError {
        SessionError::InvalidPhase {
            phase: phase.to_string(),
            action: action.to_string(),
        }
        .into()
    }
}
