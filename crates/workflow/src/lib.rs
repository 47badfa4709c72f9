//! Submission saga and the scheduled digest.
//!
//! - **Saga** (`saga`) - bounded, recorded steps tagged critical or best-effort
//! - **Submission** (`submission`) - modal submission to Notion record to Slack confirmation
//! - **Digest** (`digest`) - weekday summary of unassigned incidents

pub mod digest;
pub mod saga;
pub mod submission;

pub use digest::{next_run_after, DailyDigest, DigestError, DigestRun};
pub use saga::{
    Criticality, Saga, SagaOutcome, SagaReport, StepError, StepRecord, StepStatus, SubmissionStep,
};
pub use submission::{
    SubmissionError, SubmissionOrchestrator, SubmissionOutcome, SubmissionSettings,
};
