//! # Exam Proctor
//!
//! 在线监考编程考试的会话控制器
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有持久化介质和外部节奏，只暴露能力
//! - `KeyValueStore` - 按 (试卷, 考生) 分键的持久化存储
//! - `Clock` / `PollPolicy` / `EventSource` - 时钟、有界轮询、监考事件通道
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力只管自己的状态
//! - `DurableTimer` - 刷新不丢失的倒计时
//! - `ViolationMonitor` - 切屏 / 剪贴板 / 人脸告警计数
//! - `QuestionCache` - 每题代码与结果缓存
//! - `SubmissionPipeline` - 提交 → 轮询 → 拉取结果
//! - `FaceProctor` - 人脸监考采样循环
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 会话上下文和考生可见的控制台文本
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/session` - 会话状态机，唯一的交卷路径
//! - `orchestrator/driver` - 单任务事件循环
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use infrastructure::{FileStore, KeyValueStore, MemoryStore, StorageKeys};
pub use models::{Language, Session, Student, TestDetails};
pub use orchestrator::{
    drive, SessionCommand, SessionDeps, SessionInputs, SessionNotice, SessionOrchestrator,
    SessionPhase, SubmitTrigger,
};
pub use workflow::SessionCtx;
