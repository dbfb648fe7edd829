//! 监考事件源
//!
//! 页面可见性、剪贴板、右键菜单等事件由外部（浏览器桥接、终端前端或测试）
//! 推入通道，违规监控只订阅这个通道，不直接绑定任何全局监听。

use std::sync::Mutex;
use tokio::sync::mpsc;

/// 剪贴板操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardAction {
    Copy,
    Paste,
    Cut,
}

impl ClipboardAction {
    pub fn label(&self) -> &'static str {
        match self {
            ClipboardAction::Copy => "copy",
            ClipboardAction::Paste => "paste",
            ClipboardAction::Cut => "cut",
        }
    }
}

/// 监考事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProctorEvent {
    /// 页面切到后台
    VisibilityHidden,
    /// 页面回到前台
    VisibilityVisible,
    /// 文档级剪贴板事件
    Clipboard(ClipboardAction),
    /// 编辑器内的 Ctrl/Cmd + C/V/X 组合键（部分环境下编辑器不派发剪贴板事件）
    EditorKeyCombo(ClipboardAction),
    /// 右键菜单
    ContextMenu,
}

/// 事件源能力
pub trait EventSource: Send + Sync {
    /// 订阅事件；每个会话只允许一个有效订阅，重复订阅返回 `None`
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<ProctorEvent>>;
}

/// 基于通道的事件源
#[derive(Debug)]
pub struct ChannelEventSource {
    tx: mpsc::UnboundedSender<ProctorEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ProctorEvent>>>,
}

impl ChannelEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// 推送事件的句柄
    pub fn sender(&self) -> mpsc::UnboundedSender<ProctorEvent> {
        self.tx.clone()
    }
}

impl Default for ChannelEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for ChannelEventSource {
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<ProctorEvent>> {
        self.rx.lock().ok()?.take()
    }
}
