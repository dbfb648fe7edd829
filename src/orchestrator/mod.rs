//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一场考试的生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `session` - 会话编排器
//! - 挂载时恢复计时和违规计数
//! - 把答题命令分派给题目缓存和判题流水线
//! - 执行唯一的交卷路径（手动 / 时间耗尽 / 切屏超限）
//!
//! ### `driver` - 驱动循环
//! - 在单个任务里轮流处理计时、事件、命令、保存和判题结果
//!
//! ### `navigation` - 交卷后的跳转
//! - 阻止后退，跳转完成页
//!
//! ## 层次关系
//!
//! ```text
//! driver (事件循环)
//!     ↓
//! session (状态机)
//!     ↓
//! workflow (上下文、控制台文本)
//!     ↓
//! services (能力层：timer / monitor / cache / pipeline / face)
//!     ↓
//! infrastructure (存储、时钟、轮询、事件源)
//! ```

pub mod driver;
pub mod navigation;
pub mod session;

// 重新导出主要类型
pub use driver::{drive, SessionCommand, SessionInputs};
pub use navigation::{CompletionView, Navigator, RecordingNavigator};
pub use session::{
    EventResponse, SessionDeps, SessionNotice, SessionOrchestrator, SessionPhase,
    SessionSnapshot, SubmitStatus, SubmitTrigger,
};
