//! 判题提交流水线 - 业务能力层
//!
//! 提交代码 → 轮询状态 → 拉取用例结果 → 归一化。
//! 同一道题同一时间只允许一个运行，第二个直接拒绝，避免两个结果互相覆盖；
//! 交卷时可以通过 `join` 等待正在运行的那一次并取走它的结果。
//! 流水线不持有题目状态，结果交回调用方后不再保留任何引用。

use crate::clients::JudgeApi;
use crate::error::{AppError, AppResult, SessionError};
use crate::infrastructure::{PollError, PollPolicy};
use crate::models::{
    normalize_verdicts, Language, QuestionDetails, SubmissionStatus, SubmitRequest, Submission,
    TestResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 一次运行请求
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub question_index: usize,
    pub question: QuestionDetails,
    pub language: Language,
    pub source: String,
    pub test_id: i64,
    pub student_id: i64,
}

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub question_index: usize,
    pub submission_id: String,
    pub status: SubmissionStatus,
    pub results: Vec<TestResult>,
}

impl RunOutcome {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// 运行结束后广播给 `join` 的结果；失败只保留错误文本
type Settled = Option<Result<RunOutcome, String>>;

/// 运行中的题目登记，离开作用域时自动注销
struct InFlightGuard<'a> {
    registry: &'a Mutex<HashMap<usize, watch::Receiver<Settled>>>,
    index: usize,
    settled: watch::Sender<Settled>,
}

impl InFlightGuard<'_> {
    fn settle(&self, result: &AppResult<RunOutcome>) {
        let value = match result {
            Ok(outcome) => Ok(outcome.clone()),
            Err(e) => Err(e.to_string()),
        };
        self.settled.send_replace(Some(value));
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(&self.index);
        }
    }
}

/// 判题提交流水线
pub struct SubmissionPipeline {
    judge: Arc<dyn JudgeApi>,
    policy: PollPolicy,
    in_flight: Mutex<HashMap<usize, watch::Receiver<Settled>>>,
}

impl SubmissionPipeline {
    pub fn new(judge: Arc<dyn JudgeApi>, policy: PollPolicy) -> Self {
        Self {
            judge,
            policy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// 第 `index` 题是否有运行中的提交
    pub fn is_running(&self, index: usize) -> bool {
        self.in_flight
            .lock()
            .map(|registry| registry.contains_key(&index))
            .unwrap_or(false)
    }

    /// 运行一道题
    ///
    /// # 返回
    /// - 网络失败：`Api` 错误，可直接重试
    /// - 轮询超限：`SessionError::JudgeTimeout`
    /// - 同题已在运行：`SessionError::RunInProgress`
    pub async fn run(&self, request: RunRequest) -> AppResult<RunOutcome> {
        let guard = self.acquire(request.question_index)?;
        let result = self.execute(request).await;
        guard.settle(&result);
        result
    }

    /// 等待第 `index` 题正在进行的运行结束
    ///
    /// # 返回
    /// - `None`: 该题没有运行中的提交
    /// - `Some(result)`: 那一次运行的结果；运行被中途取消时为错误
    pub async fn join(&self, index: usize) -> Option<AppResult<RunOutcome>> {
        let mut rx = self
            .in_flight
            .lock()
            .ok()
            .and_then(|registry| registry.get(&index).cloned())?;

        debug!("[第 {} 题] 等待运行中的提交结束", index + 1);
        let settled = match rx.wait_for(|v| v.is_some()).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        Some(match settled {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(AppError::Other(message)),
            None => Err(AppError::Other(format!("第 {} 题的运行已中断", index + 1))),
        })
    }

    async fn execute(&self, request: RunRequest) -> AppResult<RunOutcome> {
        let q = request.question_index + 1;

        let submit = SubmitRequest::new(
            request.language,
            request.source.as_str(),
            request.question.id,
            request.student_id,
        );
        let submission_id = self
            .judge
            .submit(request.test_id, request.student_id, &submit)
            .await?;
        info!("[第 {} 题] ✓ 代码已提交 (提交 {})，等待判题...", q, submission_id);

        let mut submission = Submission::new(submission_id);
        let judge = &self.judge;
        let id = submission.submission_id.clone();
        let status = self
            .policy
            .poll(|| judge.status(&id), |s: &SubmissionStatus| s.is_terminal())
            .await
            .map_err(|e| match e {
                PollError::Exhausted { attempts } => {
                    warn!("[第 {} 题] ⚠️ 判题轮询 {} 次仍未结束", q, attempts);
                    AppError::from(SessionError::JudgeTimeout { attempts })
                }
                PollError::Fetch(err) => err,
            })?;
        submission.advance(status);

        let verdicts = self.judge.results(&submission.submission_id).await?;
        submission.settle(verdicts);

        let results = normalize_verdicts(&submission.verdicts, &request.question.test_cases);
        let outcome = RunOutcome {
            question_index: request.question_index,
            submission_id: submission.submission_id,
            status: submission.status,
            results,
        };
        info!(
            "[第 {} 题] ✓ 判题完成: {}/{} 通过",
            q,
            outcome.passed(),
            outcome.total()
        );
        Ok(outcome)
    }

    fn acquire(&self, index: usize) -> AppResult<InFlightGuard<'_>> {
        let mut registry = self
            .in_flight
            .lock()
            .map_err(|_| AppError::Other("运行登记锁已损坏".to_string()))?;
        if registry.contains_key(&index) {
            return Err(SessionError::RunInProgress { question: index + 1 }.into());
        }
        let (tx, rx) = watch::channel(None);
        registry.insert(index, rx);
        Ok(InFlightGuard {
            registry: &self.in_flight,
            index,
            settled: tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{JudgeVerdict, TestCaseDetails};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct ScriptedJudge {
        running_polls: u32,
        polls: AtomicU32,
        fail_submit: bool,
        verdicts: Vec<&'static str>,
    }

    #[async_trait]
    impl JudgeApi for ScriptedJudge {
        async fn submit(&self, _t: i64, _s: i64, _r: &SubmitRequest) -> AppResult<String> {
            if self.fail_submit {
                return Err(AppError::bad_response("/submissions", 503, "down"));
            }
            Ok("77".to_string())
        }

        async fn status(&self, _id: &str) -> AppResult<SubmissionStatus> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.running_polls {
                Ok(SubmissionStatus::Running)
            } else {
                Ok(SubmissionStatus::Accepted)
            }
        }

        async fn results(&self, _id: &str) -> AppResult<Vec<JudgeVerdict>> {
            Ok(self
                .verdicts
                .iter()
                .map(|s| JudgeVerdict {
                    status: s.to_string(),
                    stdout: Some("out".into()),
                    stderr: None,
                })
                .collect())
        }
    }

    fn judge(running_polls: u32, verdicts: Vec<&'static str>) -> ScriptedJudge {
        ScriptedJudge {
            running_polls,
            polls: AtomicU32::new(0),
            fail_submit: false,
            verdicts,
        }
    }

    fn request(index: usize) -> RunRequest {
        RunRequest {
            question_index: index,
            question: QuestionDetails {
                id: 100,
                description: String::new(),
                marks: None,
                language: None,
                test_cases: vec![
                    TestCaseDetails {
                        id: Some(1),
                        input_data: "1".into(),
                        expected_output: "out".into(),
                        example_case: true,
                    },
                    TestCaseDetails {
                        id: Some(2),
                        input_data: "2".into(),
                        expected_output: "out".into(),
                        example_case: false,
                    },
                ],
            },
            language: Language::Python,
            source: "print('out')".into(),
            test_id: 1,
            student_id: 2,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_normalizes_results() {
        let pipeline = SubmissionPipeline::new(Arc::new(judge(2, vec!["AC", "WA"])), PollPolicy::default());
        let outcome = pipeline.run(request(0)).await.unwrap();

        assert_eq!(outcome.submission_id, "77");
        assert_eq!(outcome.status, SubmissionStatus::Rejected);
        assert_eq!(outcome.passed(), 1);
        assert_eq!(outcome.total(), 2);
        assert!(outcome.results[0].is_example);
        assert!(!pipeline.is_running(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_cap_reports_timeout() {
        let pipeline = SubmissionPipeline::new(
            Arc::new(judge(u32::MAX, vec![])),
            PollPolicy::new(Duration::from_secs(1), 60),
        );
        let err = pipeline.run(request(0)).await.unwrap_err();

        assert!(matches!(err, AppError::Session(SessionError::JudgeTimeout { attempts: 60 })));
        assert_eq!(err.kind(), ErrorKind::Degraded);
        assert!(!pipeline.is_running(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_is_recoverable() {
        let mut j = judge(0, vec!["AC"]);
        j.fail_submit = true;
        let pipeline = SubmissionPipeline::new(Arc::new(j), PollPolicy::default());

        let err = pipeline.run(request(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Recoverable);
        assert!(!pipeline.is_running(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_same_question_rejected() {
        let pipeline = Arc::new(SubmissionPipeline::new(
            Arc::new(judge(3, vec!["AC", "AC"])),
            PollPolicy::default(),
        ));

        let first = {
            let p = pipeline.clone();
            tokio::spawn(async move { p.run(request(0)).await })
        };
        tokio::task::yield_now().await;
        assert!(pipeline.is_running(0));

        let second = pipeline.run(request(0)).await;
        assert!(matches!(
            second,
            Err(AppError::Session(SessionError::RunInProgress { question: 1 }))
        ));

        // 不同题目互不影响
        let other = pipeline.run(request(1)).await;
        assert!(other.is_ok());

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.passed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_takes_result_of_running_submission() {
        let pipeline = Arc::new(SubmissionPipeline::new(
            Arc::new(judge(3, vec!["AC", "WA"])),
            PollPolicy::default(),
        ));
        assert!(pipeline.join(0).await.is_none());

        let running = {
            let p = pipeline.clone();
            tokio::spawn(async move { p.run(request(0)).await })
        };
        tokio::task::yield_now().await;

        let joined = pipeline.join(0).await.expect("run in flight").unwrap();
        assert_eq!(joined.submission_id, "77");
        assert_eq!(joined.passed(), 1);

        let own = running.await.unwrap().unwrap();
        assert_eq!(own, joined);
        assert!(!pipeline.is_running(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_reports_failed_submission() {
        let pipeline = Arc::new(SubmissionPipeline::new(
            Arc::new(judge(u32::MAX, vec![])),
            PollPolicy::new(Duration::from_secs(1), 3),
        ));

        let running = {
            let p = pipeline.clone();
            tokio::spawn(async move { p.run(request(2)).await })
        };
        tokio::task::yield_now().await;

        let joined = pipeline.join(2).await.expect("run in flight");
        assert!(joined.unwrap_err().to_string().contains("已轮询 3 次"));
        assert!(running.await.unwrap().is_err());
    }
}
