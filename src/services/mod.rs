pub mod face_proctor;
pub mod question_cache;
pub mod submission_pipeline;
pub mod timer;
pub mod violation_monitor;

pub use face_proctor::{FaceNotice, FaceProctor, FrameSource};
pub use question_cache::{QuestionCache, QuestionPatch, QuestionState, ResultTab};
pub use submission_pipeline::{RunOutcome, RunRequest, SubmissionPipeline};
pub use timer::{DurableTimer, TimerTick, TimerUrgency};
pub use violation_monitor::{
    MonitorOutcome, MonitorSignal, ViolationLog, ViolationMonitor, MAX_TAB_SWITCHES,
    TAB_SWITCH_DEBOUNCE_MS,
};
