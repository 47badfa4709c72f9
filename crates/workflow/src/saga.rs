//! Step runner for the submission saga.
//!
//! Every external call goes through [`Saga::run`] or [`Saga::attempt`], which
//! bound it with the per-step timeout and append a [`StepRecord`] to the
//! report. Only [`Criticality::Critical`] steps can fail the saga.

use std::future::Future;
use std::time::Duration;

use incident_core::ApplicationError;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tracing::{error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Critical,
    BestEffort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStep {
    Validate,
    Acknowledge,
    ResolveIdentity,
    FetchThreadContext,
    CreateRecord,
    AppendThreadContext,
    PublishConfirmation,
    PostEphemeralAck,
    BackfillLink,
    NotifyDigestChannel,
    NotifyFailure,
}

impl SubmissionStep {
    pub fn name(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Acknowledge => "acknowledge",
            Self::ResolveIdentity => "resolve_identity",
            Self::FetchThreadContext => "fetch_thread_context",
            Self::CreateRecord => "create_record",
            Self::AppendThreadContext => "append_thread_context",
            Self::PublishConfirmation => "publish_confirmation",
            Self::PostEphemeralAck => "post_ephemeral_ack",
            Self::BackfillLink => "backfill_link",
            Self::NotifyDigestChannel => "notify_digest_channel",
            Self::NotifyFailure => "notify_failure",
        }
    }

    pub fn criticality(self) -> Criticality {
        match self {
            Self::Validate | Self::Acknowledge | Self::CreateRecord => Criticality::Critical,
            _ => Criticality::BestEffort,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    /// The call went through but produced a partial answer.
    Degraded { reason: String },
    Failed { reason: String },
    TimedOut { after_secs: u64 },
    Skipped { reason: String },
}

impl StepStatus {
    fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: SubmissionStep,
    pub criticality: Criticality,
    #[serde(flatten)]
    pub status: StepStatus,
    pub elapsed_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaOutcome {
    Completed,
    CompletedWithDegradation,
    Failed,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SagaReport {
    pub correlation_id: String,
    pub steps: Vec<StepRecord>,
    pub outcome: SagaOutcome,
}

impl SagaReport {
    /// Latest status recorded for `step`.
    pub fn status_of(&self, step: SubmissionStep) -> Option<&StepStatus> {
        self.steps.iter().rev().find(|record| record.step == step).map(|record| &record.status)
    }

    pub fn executed_steps(&self) -> Vec<SubmissionStep> {
        self.steps.iter().map(|record| record.step).collect()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("`{step}` failed: {source}")]
    Failed { step: &'static str, source: ApplicationError },
    #[error("`{step}` did not finish within {after_secs}s")]
    TimedOut { step: &'static str, after_secs: u64 },
}

impl From<StepError> for ApplicationError {
    fn from(value: StepError) -> Self {
        match value {
            StepError::Failed { source, .. } => source,
            StepError::TimedOut { step, after_secs } => {
                Self::Timeout { step: step.to_string(), timeout_secs: after_secs }
            }
        }
    }
}

pub struct Saga {
    correlation_id: String,
    step_timeout: Duration,
    steps: Vec<StepRecord>,
    rejected: bool,
}

impl Saga {
    pub fn new(correlation_id: impl Into<String>, step_timeout: Duration) -> Self {
        Self { correlation_id: correlation_id.into(), step_timeout, steps: Vec::new(), rejected: false }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Runs one external call under the step timeout and records the result.
    pub async fn run<T, E, F>(&mut self, step: SubmissionStep, call: F) -> Result<T, StepError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ApplicationError>,
    {
        let started = Instant::now();
        let result = timeout(self.step_timeout, call).await;
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(value)) => {
                self.push(step, StepStatus::Succeeded, elapsed);
                Ok(value)
            }
            Ok(Err(failure)) => {
                let source: ApplicationError = failure.into();
                self.log_failure(step, &source.to_string());
                self.push(step, StepStatus::Failed { reason: source.to_string() }, elapsed);
                Err(StepError::Failed { step: step.name(), source })
            }
            Err(_) => {
                let after_secs = self.step_timeout.as_secs();
                self.log_failure(step, &format!("timed out after {after_secs}s"));
                self.push(step, StepStatus::TimedOut { after_secs }, elapsed);
                Err(StepError::TimedOut { step: step.name(), after_secs })
            }
        }
    }

    /// [`Saga::run`] for best-effort steps whose error is already logged.
    pub async fn attempt<T, E, F>(&mut self, step: SubmissionStep, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ApplicationError>,
    {
        self.run(step, call).await.ok()
    }

    /// Records a step that needed no external call.
    pub fn record(&mut self, step: SubmissionStep, status: StepStatus) {
        self.push(step, status, Duration::ZERO);
    }

    /// Downgrades the latest record of `step` to degraded.
    pub fn degrade(&mut self, step: SubmissionStep, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(
            event_name = "saga.step_degraded",
            correlation_id = %self.correlation_id,
            step = step.name(),
            reason = %reason,
            "step finished with a partial result"
        );
        match self.steps.iter_mut().rev().find(|record| record.step == step) {
            Some(record) => record.status = StepStatus::Degraded { reason },
            None => self.push(step, StepStatus::Degraded { reason }, Duration::ZERO),
        }
    }

    pub fn skip(&mut self, step: SubmissionStep, reason: impl Into<String>) {
        self.push(step, StepStatus::Skipped { reason: reason.into() }, Duration::ZERO);
    }

    /// Marks the submission as stopped by validation.
    pub fn reject(&mut self) {
        self.rejected = true;
    }

    pub fn finish(self) -> SagaReport {
        let outcome = if self.rejected {
            SagaOutcome::Rejected
        } else if self
            .steps
            .iter()
            .any(|record| record.criticality == Criticality::Critical && record.status.is_failure())
        {
            SagaOutcome::Failed
        } else if self.steps.iter().any(|record| {
            matches!(
                record.status,
                StepStatus::Failed { .. } | StepStatus::TimedOut { .. } | StepStatus::Degraded { .. }
            )
        }) {
            SagaOutcome::CompletedWithDegradation
        } else {
            SagaOutcome::Completed
        };

        SagaReport { correlation_id: self.correlation_id, steps: self.steps, outcome }
    }

    fn push(&mut self, step: SubmissionStep, status: StepStatus, elapsed: Duration) {
        self.steps.push(StepRecord {
            step,
            criticality: step.criticality(),
            status,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
    }

    fn log_failure(&self, step: SubmissionStep, reason: &str) {
        match step.criticality() {
            Criticality::Critical => error!(
                event_name = "saga.step_failed",
                correlation_id = %self.correlation_id,
                step = step.name(),
                critical = true,
                reason,
                "critical step failed"
            ),
            Criticality::BestEffort => warn!(
                event_name = "saga.step_failed",
                correlation_id = %self.correlation_id,
                step = step.name(),
                critical = false,
                reason,
                "best-effort step failed"
            ),
        }
    }
}
