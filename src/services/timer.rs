//! 持久化倒计时 - 业务能力层
//!
//! 每次 tick 都把 (剩余秒数, 写入时间) 落盘，刷新页面或重启进程后
//! 用 `剩余 - (现在 - 写入时间)` 恢复，结果夹在 0 以上。

use crate::infrastructure::{Clock, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 落盘格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct TimerRecord {
    remaining: u64,
    timestamp: i64,
}

/// 一次 tick 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// 仍在计时，携带剩余秒数
    Running(u64),
    /// 刚刚到时，整个会话只会出现一次
    Expired,
    /// 已停止，忽略
    Stopped,
}

/// 剩余时间紧迫程度（用于界面着色）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerUrgency {
    Calm,
    Caution,
    Warning,
    Critical,
}

/// 持久化倒计时
pub struct DurableTimer {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    key: String,
    duration: u64,
    remaining: u64,
    running: bool,
    expired: bool,
    last_persisted_ms: i64,
}

impl DurableTimer {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, key: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            key: key.into(),
            duration: 0,
            remaining: 0,
            running: false,
            expired: false,
            last_persisted_ms: 0,
        }
    }

    /// 启动或恢复计时
    ///
    /// 没有落盘记录（或记录损坏、读取失败）时按完整时长重新开始；
    /// 有记录时扣除离线期间流逝的时间。恢复后已为 0 时直接返回 `Expired`。
    pub fn start(&mut self, duration_seconds: u64) -> TimerTick {
        let now = self.clock.now_ms();
        self.duration = duration_seconds;

        match self.load_record() {
            Some(record) => {
                let elapsed = ((now - record.timestamp).max(0) / 1000) as u64;
                self.remaining = record.remaining.min(duration_seconds).saturating_sub(elapsed);
                self.last_persisted_ms = record.timestamp;
                info!(
                    "⏱️ 恢复计时: 记录 {} 秒，离线 {} 秒，剩余 {} 秒",
                    record.remaining, elapsed, self.remaining
                );
            }
            None => {
                self.remaining = duration_seconds;
                self.persist(now);
                info!("⏱️ 新建计时: {} 秒", duration_seconds);
            }
        }

        if self.remaining == 0 {
            self.running = false;
            return self.signal_expiry();
        }

        self.running = true;
        TimerTick::Running(self.remaining)
    }

    /// 走一秒
    pub fn tick(&mut self) -> TimerTick {
        if !self.running {
            return TimerTick::Stopped;
        }

        self.remaining = self.remaining.saturating_sub(1);
        let now = self.clock.now_ms();
        self.persist(now);

        if self.remaining == 0 {
            self.running = false;
            return self.signal_expiry();
        }

        TimerTick::Running(self.remaining)
    }

    /// 停止计时（幂等）
    pub fn stop(&mut self) {
        if self.running {
            debug!("计时器停止，剩余 {} 秒", self.remaining);
        }
        self.running = false;
    }

    /// 重新启动已暂停的计时
    ///
    /// 暂停期间流逝的墙上时间按最后一次落盘的时间戳扣除，与刷新恢复同一口径。
    ///
    /// # 返回
    /// - `Running(剩余)`: 已重新开始
    /// - `Expired`: 暂停期间时间已耗尽
    /// - `Stopped`: 之前已到时，不可再启动
    pub fn resume(&mut self) -> TimerTick {
        if self.expired {
            return TimerTick::Stopped;
        }
        if self.running {
            return TimerTick::Running(self.remaining);
        }

        let now = self.clock.now_ms();
        let elapsed = ((now - self.last_persisted_ms).max(0) / 1000) as u64;
        self.remaining = self.remaining.saturating_sub(elapsed);
        self.persist(now);
        debug!("计时器恢复，暂停 {} 秒，剩余 {} 秒", elapsed, self.remaining);

        if self.remaining == 0 {
            return self.signal_expiry();
        }
        self.running = true;
        TimerTick::Running(self.remaining)
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn last_persisted_ms(&self) -> i64 {
        self.last_persisted_ms
    }

    /// 剩余时间占比分档：>50%、>25%、>10%、其余
    pub fn urgency(&self) -> TimerUrgency {
        if self.duration == 0 {
            return TimerUrgency::Critical;
        }
        let percentage = self.remaining as f64 * 100.0 / self.duration as f64;
        if percentage > 50.0 {
            TimerUrgency::Calm
        } else if percentage > 25.0 {
            TimerUrgency::Caution
        } else if percentage > 10.0 {
            TimerUrgency::Warning
        } else {
            TimerUrgency::Critical
        }
    }

    /// 不足五分钟
    pub fn is_hurry(&self) -> bool {
        self.remaining < 300
    }

    fn signal_expiry(&mut self) -> TimerTick {
        if self.expired {
            return TimerTick::Stopped;
        }
        self.expired = true;
        warn!("⏰ 考试时间已到");
        TimerTick::Expired
    }

    fn load_record(&self) -> Option<TimerRecord> {
        let raw = match self.store.get(&self.key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("⚠️ 读取计时记录失败，按完整时长开始: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<TimerRecord>(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("⚠️ 计时记录损坏 ({}), 按完整时长开始: {}", raw, e);
                None
            }
        }
    }

    fn persist(&mut self, now: i64) {
        let record = TimerRecord {
            remaining: self.remaining,
            timestamp: now,
        };
        self.last_persisted_ms = now;
        match serde_json::to_string(&record) {
            Ok(json) => {
                if let Err(e) = self.store.set(&self.key, &json) {
                    warn!("⚠️ 计时记录写入失败: {}", e);
                }
            }
            Err(e) => warn!("⚠️ 计时记录序列化失败: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{ManualClock, MemoryStore};

    const KEY: &str = "test-1-student-2-timer";

    fn timer(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> DurableTimer {
        DurableTimer::new(store.clone(), clock.clone(), KEY)
    }

    #[test]
    fn test_fresh_start_persists_full_duration() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let mut t = timer(&store, &clock);

        assert_eq!(t.start(3600), TimerTick::Running(3600));
        let raw = store.get(KEY).unwrap().unwrap();
        assert!(raw.contains("3600"));
        assert!(raw.contains("1000000"));
    }

    #[test]
    fn test_reload_subtracts_elapsed_time() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut t = timer(&store, &clock);
        t.start(600);
        for _ in 0..10 {
            clock.advance_secs(1);
            t.tick();
        }
        assert_eq!(t.remaining(), 590);

        // 离线 45 秒后刷新
        clock.advance_secs(45);
        let mut reloaded = timer(&store, &clock);
        assert_eq!(reloaded.start(600), TimerTick::Running(545));
    }

    #[test]
    fn test_reload_never_increases_or_goes_negative() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(10_000));
        let mut t = timer(&store, &clock);
        t.start(100);

        // 时钟回拨不会让剩余时间变多
        clock.set_ms(0);
        let mut skewed = timer(&store, &clock);
        assert_eq!(skewed.start(100), TimerTick::Running(100));

        // 离线远超剩余时间：夹到 0 并立即到时
        clock.set_ms(10_000 + 500_000);
        let mut late = timer(&store, &clock);
        assert_eq!(late.start(100), TimerTick::Expired);
        assert_eq!(late.remaining(), 0);
        assert_eq!(late.tick(), TimerTick::Stopped);
    }

    #[test]
    fn test_corrupt_record_falls_back_to_full_duration() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, "not-a-number").unwrap();
        let clock = Arc::new(ManualClock::new(0));

        let mut t = timer(&store, &clock);
        assert_eq!(t.start(120), TimerTick::Running(120));
    }

    #[test]
    fn test_expiry_signaled_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut t = timer(&store, &clock);
        t.start(3);

        assert_eq!(t.tick(), TimerTick::Running(2));
        assert_eq!(t.tick(), TimerTick::Running(1));
        assert_eq!(t.tick(), TimerTick::Expired);
        assert_eq!(t.tick(), TimerTick::Stopped);
        assert_eq!(t.resume(), TimerTick::Stopped);
        assert_eq!(t.tick(), TimerTick::Stopped);
    }

    #[test]
    fn test_stop_is_idempotent_and_resume_rearms() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut t = timer(&store, &clock);
        t.start(10);
        t.stop();
        t.stop();
        assert_eq!(t.tick(), TimerTick::Stopped);
        assert_eq!(t.resume(), TimerTick::Running(10));
        assert_eq!(t.tick(), TimerTick::Running(9));
    }

    #[test]
    fn test_resume_charges_paused_wall_time() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut t = timer(&store, &clock);
        t.start(3600);
        t.stop();

        clock.advance_secs(600);
        assert_eq!(t.resume(), TimerTick::Running(3000));
        clock.advance_secs(1);
        assert_eq!(t.tick(), TimerTick::Running(2999));

        // 刷新后沿用扣除后的剩余时间
        let mut reloaded = timer(&store, &clock);
        assert_eq!(reloaded.start(3600), TimerTick::Running(2999));
    }

    #[test]
    fn test_resume_after_long_pause_expires() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut t = timer(&store, &clock);
        t.start(60);
        t.stop();

        clock.advance_secs(120);
        assert_eq!(t.resume(), TimerTick::Expired);
        assert!(!t.is_running());
        assert_eq!(t.resume(), TimerTick::Stopped);
    }

    #[test]
    fn test_urgency_bands() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let mut t = timer(&store, &clock);
        t.start(100);
        assert_eq!(t.urgency(), TimerUrgency::Calm);
        for _ in 0..60 {
            t.tick();
        }
        assert_eq!(t.urgency(), TimerUrgency::Caution);
        for _ in 0..20 {
            t.tick();
        }
        assert_eq!(t.urgency(), TimerUrgency::Warning);
        for _ in 0..15 {
            t.tick();
        }
        assert_eq!(t.urgency(), TimerUrgency::Critical);
        assert!(t.is_hurry());
    }
}
