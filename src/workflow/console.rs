//! 控制台输出文本
//!
//! 考生在结果面板看到的全部文字都在这里拼装，会话编排只负责决定何时追加。
//! 考试期间只展开示例用例的细节，隐藏用例只计入通过数。

use crate::error::AppError;
use crate::models::TestResult;
use crate::services::MonitorSignal;

const RULE: &str = "═══════════════════════════════════════════════";

/// 一次运行的结果摘要
pub fn run_summary(results: &[TestResult]) -> String {
    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    let mut output = format!("{}\n  TEST RESULTS: {}/{} Test Cases Passed\n{}\n\n", RULE, passed, total, RULE);

    for r in results.iter().filter(|r| r.is_example) {
        if r.passed {
            output.push_str(&format!("✅ Test Case {}: PASSED\n", r.index));
            output.push_str(&format!("   Input: {}\n", r.input));
            output.push_str(&format!("   Output: {}\n\n", r.actual_output));
        } else {
            output.push_str(&format!("❌ Test Case {}: FAILED\n", r.index));
            output.push_str(&format!("   Input: {}\n", r.input));
            output.push_str(&format!("   Expected: {}\n", r.expected_output));
            output.push_str(&format!("   Got: {}\n", r.actual_output));
            if !r.stderr.is_empty() {
                output.push_str(&format!("   Error: {}\n", r.stderr));
            }
            output.push('\n');
        }
    }

    output
}

/// 运行出错
pub fn run_error(err: &AppError) -> String {
    format!("⚠️ ERROR: {}\n\nCheck your code and try again.", err)
}

pub fn running(question: usize) -> String {
    format!("⏳ Running Question {}...\n", question)
}

/// 监控信号对应的提示
///
/// # 参数
/// - `signal`: 违规监控给出的信号
/// - `clock_label`: 事件发生的本地时间（`HH:MM:SS`）
pub fn monitor_warning(signal: &MonitorSignal, clock_label: &str) -> String {
    match signal {
        MonitorSignal::TabSwitchWarning { remaining, .. } => format!(
            "\n⚠️ WARNING: Tab switch detected at {}!\n⚠️ {} warning{} remaining before auto-submit!\n",
            clock_label,
            remaining,
            if *remaining == 1 { "" } else { "s" }
        ),
        MonitorSignal::ForceSubmit { .. } => format!(
            "\n⚠️ WARNING: Tab switch detected at {}!\n🚨 MAXIMUM TAB SWITCHES EXCEEDED! Test will be auto-submitted.\n",
            clock_label
        ),
        MonitorSignal::ClipboardBlocked { .. } => {
            "\n⚠️ Copy/Paste/Cut operations are disabled during the exam!\n".to_string()
        }
        MonitorSignal::FaceWarning { status, count } => format!(
            "\n⚠️ Proctoring warning ({}) at {}. Total warnings: {}\n",
            status.replace('_', " "),
            clock_label,
            count
        ),
    }
}

/// 交卷前自动运行的结果
pub fn auto_run_summary(question: usize, passed: usize, total: usize) -> String {
    format!("✓ Question {}: {}/{} test cases passed\n", question, passed, total)
}

pub fn auto_run_failed(question: usize) -> String {
    format!("⚠️ Could not auto-run Question {}\n", question)
}

pub fn time_up() -> String {
    "\n⏰ Time is up! Your test is being submitted automatically.\n".to_string()
}

pub fn violation_limit(count: u32) -> String {
    format!(
        "\n🚨 Tab switch limit reached ({} switches). Your test is being submitted automatically.\n",
        count
    )
}

pub fn submit_success() -> String {
    "\n✅ Test submitted successfully!\n".to_string()
}

pub fn submit_failed(err: &AppError) -> String {
    format!("\n❌ Submission failed: {}\nPlease try again.\n", err)
}

pub fn proctoring_unavailable() -> String {
    "⚠️ Warning: Proctoring could not be activated.\n".to_string()
}
