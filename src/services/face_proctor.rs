//! 人脸监考循环 - 业务能力层
//!
//! 按固定间隔采一帧交给视觉服务，非 `ok` 的判定作为提醒送回会话。
//! 提醒不计入强制交卷阈值，摄像头不可用时会话照常进行。

use crate::clients::{FrameAnalysis, ProctorApi};
use crate::error::AppResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 画面来源（摄像头）
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// 打开摄像头
    async fn start(&self) -> AppResult<()>;
    /// 采一帧，返回 base64 编码的图像；暂时没有画面时返回 `None`
    async fn capture(&self) -> AppResult<Option<String>>;
    /// 释放摄像头
    fn stop(&self);
}

/// 一次人脸异常提醒
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceNotice {
    pub status: String,
    pub warnings: Vec<String>,
}

impl From<FrameAnalysis> for FaceNotice {
    fn from(analysis: FrameAnalysis) -> Self {
        Self {
            status: analysis.status,
            warnings: analysis.warnings,
        }
    }
}

/// 运行中的人脸监考
pub struct FaceProctor {
    source: Arc<dyn FrameSource>,
    api: Arc<dyn ProctorApi>,
    interval: Duration,
    notices: mpsc::UnboundedSender<FaceNotice>,
    handle: Option<JoinHandle<()>>,
}

impl FaceProctor {
    /// 打开摄像头并启动采样循环
    ///
    /// # 返回
    /// 摄像头打开失败时返回错误，调用方按降级处理
    pub async fn spawn(
        source: Arc<dyn FrameSource>,
        api: Arc<dyn ProctorApi>,
        interval: Duration,
        notices: mpsc::UnboundedSender<FaceNotice>,
    ) -> AppResult<Self> {
        let mut proctor = Self {
            source,
            api,
            interval,
            notices,
            handle: None,
        };
        proctor.launch().await?;
        info!("📷 人脸监考已开启，间隔 {:?}", interval);
        Ok(proctor)
    }

    /// 关闭后重新打开摄像头并恢复采样（已在运行时不做任何事）
    pub async fn restart(&mut self) -> AppResult<()> {
        if self.is_running() {
            return Ok(());
        }
        self.launch().await?;
        info!("📷 人脸监考已恢复");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 终止采样循环并释放摄像头（幂等）
    pub async fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.abort();
        self.source.stop();
        if let Err(e) = self.api.stop().await {
            debug!("视觉服务停止通知失败: {}", e);
        }
        info!("📷 人脸监考已关闭");
    }

    async fn launch(&mut self) -> AppResult<()> {
        self.source.start().await?;
        if let Err(e) = self.api.start().await {
            warn!("⚠️ 视觉服务启动通知失败，继续采样: {}", e);
        }
        self.handle = Some(tokio::spawn(sample_loop(
            self.source.clone(),
            self.api.clone(),
            self.interval,
            self.notices.clone(),
        )));
        Ok(())
    }
}

impl Drop for FaceProctor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            self.source.stop();
        }
    }
}

async fn sample_loop(
    source: Arc<dyn FrameSource>,
    api: Arc<dyn ProctorApi>,
    interval: Duration,
    notices: mpsc::UnboundedSender<FaceNotice>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let frame = match source.capture().await {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                warn!("⚠️ 采集画面失败: {}", e);
                continue;
            }
        };

        match api.process_frame(&frame).await {
            Ok(analysis) if analysis.is_ok() => {}
            Ok(analysis) => {
                debug!("人脸判定异常: {}", analysis.status);
                if notices.send(analysis.into()).is_err() {
                    break;
                }
            }
            Err(e) => warn!("⚠️ 画面分析失败: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeCamera {
        broken: bool,
        stopped: AtomicBool,
    }

    #[async_trait]
    impl FrameSource for FakeCamera {
        async fn start(&self) -> AppResult<()> {
            if self.broken {
                return Err(AppError::Other("camera denied".into()));
            }
            Ok(())
        }

        async fn capture(&self) -> AppResult<Option<String>> {
            Ok(Some("ZnJhbWU=".into()))
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// 依次返回 ok, no_face, ok, no_face ...
    #[derive(Default)]
    struct AlternatingVision {
        frames: AtomicU32,
    }

    #[async_trait]
    impl ProctorApi for AlternatingVision {
        async fn start(&self) -> AppResult<()> {
            Ok(())
        }

        async fn stop(&self) -> AppResult<()> {
            Ok(())
        }

        async fn process_frame(&self, _frame: &str) -> AppResult<FrameAnalysis> {
            let n = self.frames.fetch_add(1, Ordering::SeqCst);
            let status = if n % 2 == 0 { "ok" } else { "no_face" };
            Ok(FrameAnalysis {
                success: true,
                status: status.into(),
                warnings: vec![],
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_ok_frames_become_notices() {
        let camera = Arc::new(FakeCamera::default());
        let vision = Arc::new(AlternatingVision::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut proctor =
            FaceProctor::spawn(camera.clone(), vision.clone(), Duration::from_secs(5), tx)
                .await
                .unwrap();

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.status, "no_face");
        assert!(proctor.is_running());

        proctor.shutdown().await;
        assert!(camera.stopped.load(Ordering::SeqCst));

        let seen = vision.frames.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(vision.frames.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_camera_failure_is_reported() {
        let camera = Arc::new(FakeCamera {
            broken: true,
            ..Default::default()
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = FaceProctor::spawn(
            camera,
            Arc::new(AlternatingVision::default()),
            Duration::from_secs(5),
            tx,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_shutdown_resumes_sampling() {
        let camera = Arc::new(FakeCamera::default());
        let vision = Arc::new(AlternatingVision::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut proctor =
            FaceProctor::spawn(camera.clone(), vision.clone(), Duration::from_secs(5), tx)
                .await
                .unwrap();
        proctor.shutdown().await;
        assert!(!proctor.is_running());
        while rx.try_recv().is_ok() {}

        proctor.restart().await.unwrap();
        assert!(proctor.is_running());
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.status, "no_face");

        // 已在运行时重复调用不会多开一个循环
        proctor.restart().await.unwrap();
        assert!(proctor.is_running());
    }
}
