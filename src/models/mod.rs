pub mod exam;
pub mod language;
pub mod payload;
pub mod submission;

pub use exam::{QuestionDetails, Session, Student, TestCaseDetails, TestDetails};
pub use language::Language;
pub use payload::{FinalSubmitPayload, QuestionResult, ResultEntry, StudentRecord};
pub use submission::{
    normalize_verdicts, JudgeVerdict, StatusResponse, SubmissionStatus, SubmissionTicket,
    SubmitRequest, Submission, TestResult,
};
