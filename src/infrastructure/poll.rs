//! 有界轮询策略
//!
//! 所有"等一会儿再问一次"的场景共用同一套节奏：固定间隔、最多 N 次、
//! 由调用方判断何时算终态。超过上限时明确失败，绝不无限挂起。

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// 轮询失败
#[derive(Debug)]
pub enum PollError<E> {
    /// 达到次数上限仍未进入终态
    Exhausted { attempts: u32 },
    /// 单次查询失败
    Fetch(E),
}

/// 轮询策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// 每次查询前的等待时间
    pub interval: Duration,
    /// 最大查询次数
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// 按策略轮询，直到 `is_terminal` 返回 true
    ///
    /// # 参数
    /// - `fetch`: 单次查询
    /// - `is_terminal`: 终态判断
    ///
    /// # 返回
    /// 第一个终态值；超过上限返回 `PollError::Exhausted`
    pub async fn poll<T, E, F, Fut, P>(&self, mut fetch: F, is_terminal: P) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&T) -> bool,
    {
        for attempt in 1..=self.max_attempts {
            sleep(self.interval).await;
            let value = fetch().await.map_err(PollError::Fetch)?;
            if is_terminal(&value) {
                debug!("轮询第 {} 次进入终态", attempt);
                return Ok(value);
            }
        }

        Err(PollError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
