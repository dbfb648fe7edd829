//! 违规监控 - 业务能力层
//!
//! 只负责"数违规"：切屏去抖计数、剪贴板拦截计数、人脸告警计数，
//! 计数立即落盘；切屏达到上限时给出一次性的强制交卷信号。

use crate::infrastructure::{ClipboardAction, Clock, KeyValueStore, ProctorEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 切屏上限
pub const MAX_TAB_SWITCHES: u32 = 5;
/// 切屏去抖窗口（毫秒）
pub const TAB_SWITCH_DEBOUNCE_MS: i64 = 3000;

/// 违规记录（只增不减）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationLog {
    pub tab_switch_count: u32,
    pub copy_paste_attempts: u32,
    #[serde(default)]
    pub face_warnings: u32,
    #[serde(default)]
    pub last_warning_epoch: Option<i64>,
    #[serde(default)]
    pub last_tab_switch_epoch: Option<i64>,
}

impl ViolationLog {
    /// 合并两份记录，逐项取最大值
    fn merge_max(&self, other: &ViolationLog) -> ViolationLog {
        ViolationLog {
            tab_switch_count: self.tab_switch_count.max(other.tab_switch_count),
            copy_paste_attempts: self.copy_paste_attempts.max(other.copy_paste_attempts),
            face_warnings: self.face_warnings.max(other.face_warnings),
            last_warning_epoch: self.last_warning_epoch.max(other.last_warning_epoch),
            last_tab_switch_epoch: self.last_tab_switch_epoch.max(other.last_tab_switch_epoch),
        }
    }
}

/// 监控信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorSignal {
    /// 切屏警告，携带剩余次数
    TabSwitchWarning { count: u32, remaining: u32 },
    /// 剪贴板操作被拦截
    ClipboardBlocked { action: ClipboardAction, attempts: u32 },
    /// 人脸监考告警
    FaceWarning { status: String, count: u32 },
    /// 切屏达到上限，必须强制交卷
    ForceSubmit { count: u32 },
}

impl MonitorSignal {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorSignal::ForceSubmit { .. })
    }
}

/// 处理一个事件的结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonitorOutcome {
    pub signal: Option<MonitorSignal>,
    /// 事件源需要阻止该事件的默认行为（剪贴板、右键菜单）
    pub suppress_default: bool,
}

/// 违规监控
pub struct ViolationMonitor {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    key: String,
    log: ViolationLog,
    max_tab_switches: u32,
    debounce_ms: i64,
    active: bool,
    terminal: bool,
}

impl ViolationMonitor {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, key: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            key: key.into(),
            log: ViolationLog::default(),
            max_tab_switches: MAX_TAB_SWITCHES,
            debounce_ms: TAB_SWITCH_DEBOUNCE_MS,
            active: false,
            terminal: false,
        }
    }

    pub fn with_limits(mut self, max_tab_switches: u32, debounce_ms: i64) -> Self {
        self.max_tab_switches = max_tab_switches.max(1);
        self.debounce_ms = debounce_ms.max(0);
        self
    }

    /// 恢复落盘的计数并开始监控
    ///
    /// # 返回
    /// 恢复出的切屏次数已达上限时返回 true（刷新页面不能绕过强制交卷）
    pub fn start(&mut self) -> bool {
        match self.store.get(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<ViolationLog>(&raw) {
                Ok(saved) => self.log = self.log.merge_max(&saved),
                Err(e) => warn!("⚠️ 违规记录损坏，保留当前计数: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("⚠️ 读取违规记录失败，保留当前计数: {}", e),
        }

        self.active = true;
        info!(
            "🛡️ 违规监控已启动 (切屏 {}/{}, 剪贴板 {})",
            self.log.tab_switch_count, self.max_tab_switches, self.log.copy_paste_attempts
        );

        if self.log.tab_switch_count >= self.max_tab_switches {
            self.terminal = true;
            return true;
        }
        false
    }

    /// 暂停计数（幂等）
    pub fn stop(&mut self) {
        self.active = false;
    }

    /// 恢复计数；已触发强制交卷后不再恢复
    pub fn resume(&mut self) -> bool {
        if self.terminal {
            return false;
        }
        self.active = true;
        true
    }

    pub fn log(&self) -> &ViolationLog {
        &self.log
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn max_tab_switches(&self) -> u32 {
        self.max_tab_switches
    }

    /// 处理一个监考事件
    pub fn handle(&mut self, event: ProctorEvent) -> MonitorOutcome {
        match event {
            ProctorEvent::VisibilityHidden => MonitorOutcome {
                signal: self.on_tab_switch(),
                suppress_default: false,
            },
            ProctorEvent::VisibilityVisible => MonitorOutcome::default(),
            ProctorEvent::Clipboard(action) | ProctorEvent::EditorKeyCombo(action) => MonitorOutcome {
                signal: self.on_clipboard(action),
                suppress_default: true,
            },
            ProctorEvent::ContextMenu => MonitorOutcome {
                signal: None,
                suppress_default: true,
            },
        }
    }

    /// 记录一次人脸监考告警（不会触发强制交卷）
    pub fn record_face_warning(&mut self, status: &str) -> Option<MonitorSignal> {
        if !self.active {
            return None;
        }
        self.log.face_warnings += 1;
        self.log.last_warning_epoch = Some(self.clock.now_ms());
        self.persist();
        Some(MonitorSignal::FaceWarning {
            status: status.to_string(),
            count: self.log.face_warnings,
        })
    }

    fn on_tab_switch(&mut self) -> Option<MonitorSignal> {
        if !self.active || self.terminal {
            return None;
        }

        let now = self.clock.now_ms();
        if let Some(last) = self.log.last_tab_switch_epoch {
            if now - last < self.debounce_ms {
                debug!("切屏事件在去抖窗口内 ({} ms)，忽略", now - last);
                return None;
            }
        }

        self.log.tab_switch_count += 1;
        self.log.last_tab_switch_epoch = Some(now);
        self.log.last_warning_epoch = Some(now);
        self.persist();

        let count = self.log.tab_switch_count;
        if count >= self.max_tab_switches {
            self.terminal = true;
            warn!("🚨 切屏次数达到上限 {}，将强制交卷", count);
            return Some(MonitorSignal::ForceSubmit { count });
        }

        let remaining = self.max_tab_switches - count;
        warn!("⚠️ 检测到切屏 ({}/{})，剩余 {} 次", count, self.max_tab_switches, remaining);
        Some(MonitorSignal::TabSwitchWarning { count, remaining })
    }

    fn on_clipboard(&mut self, action: ClipboardAction) -> Option<MonitorSignal> {
        if !self.active {
            return None;
        }
        self.log.copy_paste_attempts += 1;
        self.log.last_warning_epoch = Some(self.clock.now_ms());
        self.persist();

        warn!("⚠️ 拦截剪贴板操作 {} (累计 {})", action.label(), self.log.copy_paste_attempts);
        Some(MonitorSignal::ClipboardBlocked {
            action,
            attempts: self.log.copy_paste_attempts,
        })
    }

    fn persist(&self) {
        match serde_json::to_string(&self.log) {
            Ok(json) => {
                if let Err(e) = self.store.set(&self.key, &json) {
                    warn!("⚠️ 违规记录写入失败: {}", e);
                }
            }
            Err(e) => warn!("⚠️ 违规记录序列化失败: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{ManualClock, MemoryStore};

    const KEY: &str = "test-1-student-2-violations";

    fn monitor(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> ViolationMonitor {
        let mut m = ViolationMonitor::new(store.clone(), clock.clone(), KEY);
        m.start();
        m
    }

    #[test]
    fn test_rapid_switches_are_debounced() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut m = monitor(&store, &clock);

        let mut forced = 0;
        for _ in 0..5 {
            let out = m.handle(ProctorEvent::VisibilityHidden);
            if matches!(out.signal, Some(MonitorSignal::ForceSubmit { .. })) {
                forced += 1;
            }
            clock.advance_ms(500);
        }

        assert!(m.log().tab_switch_count < 5);
        assert_eq!(m.log().tab_switch_count, 1);
        assert_eq!(forced, 0);
    }

    #[test]
    fn test_spaced_switches_force_submit_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut m = monitor(&store, &clock);

        let mut signals = Vec::new();
        for _ in 0..7 {
            signals.push(m.handle(ProctorEvent::VisibilityHidden).signal);
            clock.advance_secs(4);
        }

        assert_eq!(
            signals[0],
            Some(MonitorSignal::TabSwitchWarning { count: 1, remaining: 4 })
        );
        assert_eq!(signals[4], Some(MonitorSignal::ForceSubmit { count: 5 }));
        let forced = signals.iter().filter(|s| matches!(s, Some(MonitorSignal::ForceSubmit { .. }))).count();
        assert_eq!(forced, 1);
        assert!(m.is_terminal());
        assert!(!m.resume());
    }

    #[test]
    fn test_clipboard_never_forces_and_suppresses_default() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut m = monitor(&store, &clock);

        for _ in 0..20 {
            let out = m.handle(ProctorEvent::Clipboard(ClipboardAction::Paste));
            assert!(out.suppress_default);
            assert!(!out.signal.unwrap().is_terminal());
        }
        let out = m.handle(ProctorEvent::EditorKeyCombo(ClipboardAction::Copy));
        assert!(out.suppress_default);
        assert!(m.handle(ProctorEvent::ContextMenu).suppress_default);

        assert_eq!(m.log().copy_paste_attempts, 21);
        assert_eq!(m.log().tab_switch_count, 0);
        assert!(!m.is_terminal());
    }

    #[test]
    fn test_counts_survive_reload() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        {
            let mut m = monitor(&store, &clock);
            m.handle(ProctorEvent::VisibilityHidden);
            clock.advance_secs(5);
            m.handle(ProctorEvent::VisibilityHidden);
            m.handle(ProctorEvent::Clipboard(ClipboardAction::Cut));
        }

        let reloaded = monitor(&store, &clock);
        assert_eq!(reloaded.log().tab_switch_count, 2);
        assert_eq!(reloaded.log().copy_paste_attempts, 1);
    }

    #[test]
    fn test_reload_at_threshold_reports_terminal() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        store
            .set(KEY, r#"{"tabSwitchCount":5,"copyPasteAttempts":0}"#)
            .unwrap();

        let mut m = ViolationMonitor::new(store.clone(), clock.clone(), KEY);
        assert!(m.start());
        clock.advance_secs(10);
        assert_eq!(m.handle(ProctorEvent::VisibilityHidden).signal, None);
    }

    #[test]
    fn test_stopped_monitor_ignores_events() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut m = monitor(&store, &clock);
        m.stop();
        m.stop();

        assert_eq!(m.handle(ProctorEvent::VisibilityHidden).signal, None);
        let out = m.handle(ProctorEvent::Clipboard(ClipboardAction::Copy));
        assert_eq!(out.signal, None);
        assert!(out.suppress_default);
        assert_eq!(m.log().tab_switch_count, 0);
    }
}
