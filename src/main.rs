use anyhow::{Context, Result};
use async_trait::async_trait;
use exam_proctor::clients::{GradingApi, GradingClient, JudgeClient, ProctorClient};
use exam_proctor::infrastructure::{ChannelEventSource, ClipboardAction, Clock, EventSource, FileStore, ProctorEvent, SystemClock};
use exam_proctor::models::{Language, Session, Student};
use exam_proctor::orchestrator::{
    drive, CompletionView, RecordingNavigator, SessionCommand, SessionDeps, SessionInputs,
    SessionNotice, SessionOrchestrator,
};
use exam_proctor::services::{FaceNotice, FaceProctor, FrameSource};
use exam_proctor::utils::logging;
use exam_proctor::{AppResult, Config, SessionCtx};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 用法: exam_proctor <考试链接令牌> [配置文件.toml]
#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let link_token = args
        .next()
        .or_else(|| std::env::var("EXAM_LINK_TOKEN").ok())
        .context("缺少考试链接令牌: exam_proctor <token> [config.toml]")?;

    // 加载配置
    let config = match args.next().or_else(|| std::env::var("EXAM_CONFIG").ok()) {
        Some(path) => Config::from_toml_file(&path)?,
        None => Config::from_env(),
    };

    // 初始化日志
    logging::init(config.verbose_logging);

    let student = student_from_env()?;
    let grading = Arc::new(GradingClient::new(&config)?);
    let test = grading.fetch_test(&link_token).await?;

    let clock = Arc::new(SystemClock);
    let session = Session::new(test, student, Some(link_token), clock.now_ms());
    let ctx = SessionCtx::from_session(&session);
    logging::init_log_file(&config.log_file, &ctx.to_string())?;

    let navigator = Arc::new(RecordingNavigator::new());
    let deps = SessionDeps {
        store: Arc::new(FileStore::open(&config.state_file)?),
        clock,
        judge: Arc::new(JudgeClient::new(&config)?),
        grading,
        navigator: navigator.clone(),
    };

    let (mut orchestrator, notices) = SessionOrchestrator::new(session, &config, deps)?;
    let pending = orchestrator.mount()?;
    let face = start_face_proctoring(&config, &mut orchestrator).await;

    let events = ChannelEventSource::new();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(print_notices(notices));
    tokio::spawn(read_stdin(command_tx, events.sender()));

    let inputs = SessionInputs {
        commands: command_rx,
        events: events.subscribe().context("监考事件源已被订阅")?,
        face,
    };
    drive(&mut orchestrator, inputs, pending).await?;

    if let Some(view) = navigator.completion() {
        print_completion(&view);
    }
    Ok(())
}

fn student_from_env() -> Result<Student> {
    let id = std::env::var("EXAM_STUDENT_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .context("缺少或无效的 EXAM_STUDENT_ID")?;

    Ok(Student {
        id,
        name: std::env::var("EXAM_STUDENT_NAME").unwrap_or_default(),
        email: std::env::var("EXAM_STUDENT_EMAIL").unwrap_or_default(),
        batch: std::env::var("EXAM_STUDENT_BATCH").unwrap_or_default(),
    })
}

/// 从文件读取画面（文件内容为 base64 编码的图像），供无摄像头环境使用
struct FileFrameSource {
    path: PathBuf,
}

#[async_trait]
impl FrameSource for FileFrameSource {
    async fn start(&self) -> AppResult<()> {
        tokio::fs::metadata(&self.path).await?;
        Ok(())
    }

    async fn capture(&self) -> AppResult<Option<String>> {
        let frame = tokio::fs::read_to_string(&self.path).await?;
        let frame = frame.trim();
        Ok((!frame.is_empty()).then(|| frame.to_string()))
    }

    fn stop(&self) {}
}

/// 配置了视觉服务且提供了画面来源时开启人脸监考
async fn start_face_proctoring(
    config: &Config,
    orchestrator: &mut SessionOrchestrator,
) -> Option<mpsc::UnboundedReceiver<FaceNotice>> {
    let base_url = config.proctor_base_url.clone()?;
    let Some(frame_file) = std::env::var("EXAM_FRAME_FILE").ok() else {
        warn!("⚠️ 已配置人脸监考服务，但未提供画面来源 (EXAM_FRAME_FILE)");
        return None;
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let started = match ProctorClient::new(config, base_url) {
        Ok(client) => {
            FaceProctor::spawn(
                Arc::new(FileFrameSource {
                    path: PathBuf::from(frame_file),
                }),
                Arc::new(client),
                config.proctor_interval(),
                tx,
            )
            .await
        }
        Err(e) => Err(e),
    };

    match started {
        Ok(proctor) => {
            orchestrator.attach_proctor(proctor);
            Some(rx)
        }
        Err(e) => {
            orchestrator.report_proctoring_unavailable(&e);
            None
        }
    }
}

enum Input {
    Command(SessionCommand),
    Events(Vec<ProctorEvent>),
}

async fn read_stdin(commands: mpsc::UnboundedSender<SessionCommand>, events: mpsc::UnboundedSender<ProctorEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let delivered = match parse_line(line).await {
            Ok(Input::Command(command)) => commands.send(command).is_ok(),
            Ok(Input::Events(batch)) => batch.into_iter().all(|e| events.send(e).is_ok()),
            Err(message) => {
                eprintln!("⚠️ {}", message);
                true
            }
        };
        if !delivered {
            break;
        }
    }
    info!("标准输入已关闭");
}

async fn parse_line(line: &str) -> std::result::Result<Input, String> {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match verb {
        "q" => {
            let n: usize = rest.parse().map_err(|_| format!("无效的题号: {}", rest))?;
            SessionCommand::Select(n.saturating_sub(1))
        }
        "lang" => SessionCommand::ChangeLanguage(rest.parse::<Language>()?),
        "load" => {
            let source = tokio::fs::read_to_string(rest)
                .await
                .map_err(|e| format!("读取 {} 失败: {}", rest, e))?;
            SessionCommand::Edit(source)
        }
        "reset" => SessionCommand::Reset,
        "run" => SessionCommand::Run,
        "submit" => SessionCommand::RequestSubmit,
        "confirm" => SessionCommand::ConfirmSubmit,
        "cancel" => SessionCommand::CancelSubmit,
        "back" => SessionCommand::Back,
        "status" => SessionCommand::Status,
        "hidden" => {
            return Ok(Input::Events(vec![
                ProctorEvent::VisibilityHidden,
                ProctorEvent::VisibilityVisible,
            ]))
        }
        "copy" => return Ok(Input::Events(vec![ProctorEvent::Clipboard(ClipboardAction::Copy)])),
        "paste" => return Ok(Input::Events(vec![ProctorEvent::Clipboard(ClipboardAction::Paste)])),
        other => return Err(format!("未知命令: {}", other)),
    };
    Ok(Input::Command(command))
}

async fn print_notices(mut notices: mpsc::UnboundedReceiver<SessionNotice>) {
    while let Some(notice) = notices.recv().await {
        match notice {
            SessionNotice::Console { question, text } => println!("[Q{}] {}", question, text),
            SessionNotice::Warning(_) => {}
            SessionNotice::RunFinished { question, passed, total } => {
                println!("▶ Question {}: {}/{} passed", question, passed, total)
            }
            SessionNotice::RunFailed { question, message, .. } => {
                println!("▶ Question {} failed: {}", question, message)
            }
            SessionNotice::ConfirmRequested { attempted, total } => println!(
                "❓ {}/{} questions attempted. Type `confirm` to submit or `cancel` to continue.",
                attempted, total
            ),
            SessionNotice::ForcedSubmit { cause } => println!("🚨 {}", cause),
            SessionNotice::SubmitFailed { message } => {
                println!("❌ {}\nType `confirm` to retry.", message)
            }
            SessionNotice::Submitted(_) => {}
            SessionNotice::Rejected { message } => println!("⚠️ {}", message),
            SessionNotice::Status(s) => println!(
                "⏱️ {} | {} | Q{}/{} ({}) | attempted {} | tab switches {}/{} | clipboard {}",
                s.time_label,
                s.phase,
                s.active_index + 1,
                s.question_count,
                s.language.map(|l| l.to_string()).unwrap_or_default(),
                s.attempted_count,
                s.tab_switch_count,
                s.max_tab_switches,
                s.copy_paste_attempts
            ),
        }
    }
}

fn print_completion(view: &CompletionView) {
    println!("{}", "=".repeat(60));
    println!("✅ {} submitted", view.test_title);
    if let Some(name) = &view.student.name {
        println!("Student: {}", name);
    }
    println!(
        "Attempted {}/{}, fully correct {}",
        view.attempted_count(),
        view.question_results.len(),
        view.correct_count()
    );
    println!(
        "Tab switches: {}, clipboard attempts: {}",
        view.tab_switch_count, view.copy_paste_attempts
    );
    if view.trigger.is_forced() {
        println!("Submitted automatically: {}", view.trigger.describe());
    }
    println!("{}", "=".repeat(60));
}
