//! 会话驱动循环 - 编排层
//!
//! 单任务协作式调度：秒级计时、监考事件、界面命令、代码保存、
//! 运行中的判题和人脸提醒都在同一个 `select!` 里轮流处理，
//! 编排器的状态因此只会被一个地方修改。

use crate::error::AppResult;
use crate::infrastructure::ProctorEvent;
use crate::models::Language;
use crate::orchestrator::session::{SessionOrchestrator, SessionPhase, SubmitTrigger};
use crate::services::{FaceNotice, RunOutcome};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::future::pending;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::{debug, info, warn};

/// 界面命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// 切换到第 n 题（从 0 开始）
    Select(usize),
    /// 替换当前题代码
    Edit(String),
    ChangeLanguage(Language),
    Reset,
    Run,
    RequestSubmit,
    CancelSubmit,
    ConfirmSubmit,
    /// 浏览器后退
    Back,
    Status,
}

/// 驱动循环的输入
pub struct SessionInputs {
    pub commands: mpsc::UnboundedReceiver<SessionCommand>,
    pub events: mpsc::UnboundedReceiver<ProctorEvent>,
    pub face: Option<mpsc::UnboundedReceiver<FaceNotice>>,
}

/// 判题在独立任务里进行，交卷等待它时不依赖本循环继续轮询
type RunTask = JoinHandle<(usize, AppResult<RunOutcome>)>;

/// 驱动会话直到交卷成功
///
/// # 参数
/// - `pending`: 挂载时已经要求的强制交卷（见 `SessionOrchestrator::mount`）
pub async fn drive(
    orchestrator: &mut SessionOrchestrator,
    mut inputs: SessionInputs,
    pending: Option<SubmitTrigger>,
) -> AppResult<()> {
    info!("{} 🚀 会话开始运行", orchestrator.ctx());

    if let Some(trigger) = pending {
        force_submit(orchestrator, trigger).await;
    }

    let second = Duration::from_secs(1);
    let mut ticker = interval_at(Instant::now() + second, second);
    let mut runs: FuturesUnordered<RunTask> = FuturesUnordered::new();

    while orchestrator.phase() != SessionPhase::Submitted {
        let deadline = orchestrator.next_flush_deadline();

        tokio::select! {
            _ = ticker.tick() => {
                if let Some(trigger) = orchestrator.on_tick() {
                    force_submit(orchestrator, trigger).await;
                }
            }
            Some(event) = inputs.events.recv() => {
                let response = orchestrator.on_event(event);
                if response.suppress_default {
                    debug!("已拦截事件默认行为: {:?}", event);
                }
                if let Some(trigger) = response.trigger {
                    force_submit(orchestrator, trigger).await;
                }
            }
            Some(command) = inputs.commands.recv() => {
                handle_command(orchestrator, &mut runs, command).await;
            }
            Some(notice) = recv_optional(&mut inputs.face) => {
                orchestrator.on_face_notice(notice);
            }
            Some(joined) = runs.next(), if !runs.is_empty() => match joined {
                Ok((index, result)) => {
                    // 失败已写入控制台
                    let _ = orchestrator.apply_run_outcome(index, result);
                }
                Err(e) => warn!("{} ⚠️ 运行任务异常退出: {}", orchestrator.ctx(), e),
            },
            _ = sleep_until_optional(deadline) => {
                orchestrator.flush_due(Instant::now());
            }
        }
    }

    info!("{} ✓ 会话结束", orchestrator.ctx());
    Ok(())
}

async fn handle_command(
    orchestrator: &mut SessionOrchestrator,
    runs: &mut FuturesUnordered<RunTask>,
    command: SessionCommand,
) {
    let now = Instant::now();
    let result = match command {
        SessionCommand::Select(index) => orchestrator.select_question(index),
        SessionCommand::Edit(source) => orchestrator.edit_source(source, now),
        SessionCommand::ChangeLanguage(language) => orchestrator.change_language(language, now),
        SessionCommand::Reset => orchestrator.reset_source(now),
        SessionCommand::Run => orchestrator.prepare_run().map(|request| {
            let pipeline = orchestrator.pipeline();
            let index = request.question_index;
            runs.push(tokio::spawn(async move { (index, pipeline.run(request).await) }));
        }),
        SessionCommand::RequestSubmit => orchestrator.request_submit(),
        SessionCommand::CancelSubmit => match orchestrator.cancel_submit().await {
            Ok(Some(trigger)) => {
                force_submit(orchestrator, trigger).await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        },
        SessionCommand::ConfirmSubmit => {
            // 失败已由编排器通知界面
            if let Err(e) = orchestrator.confirm_submit().await {
                debug!("交卷未完成: {}", e);
            }
            Ok(())
        }
        SessionCommand::Back => {
            if !orchestrator.on_back_navigation() {
                debug!("已交卷，拒绝后退");
            }
            Ok(())
        }
        SessionCommand::Status => {
            orchestrator.publish_status();
            Ok(())
        }
    };

    if let Err(e) = result {
        orchestrator.reject(&e);
    }
}

async fn force_submit(orchestrator: &mut SessionOrchestrator, trigger: SubmitTrigger) {
    if let Err(e) = orchestrator.final_submit(trigger).await {
        warn!("{} ⚠️ 强制交卷未完成 ({}): {}", orchestrator.ctx(), trigger.describe(), e);
    }
}

async fn recv_optional<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn sleep_until_optional(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
