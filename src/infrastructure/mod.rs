//! 基础设施层（Infrastructure）
//!
//! 持有持久化介质、时钟、事件通道、轮询节奏这类"能力"，不认识题目和会话流程。

pub mod clock;
pub mod events;
pub mod poll;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{ChannelEventSource, ClipboardAction, EventSource, ProctorEvent};
pub use poll::{PollError, PollPolicy};
pub use store::{FileStore, KeyValueStore, MemoryStore, StorageKeys};
