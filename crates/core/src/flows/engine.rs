use thiserror::Error;

use crate::flows::states::{SubmissionEvent, SubmissionState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> SubmissionState;
    fn transition(
        &self,
        current: SubmissionState,
        event: SubmissionEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct IncidentSubmissionFlow;

impl FlowDefinition for IncidentSubmissionFlow {
    fn initial_state(&self) -> SubmissionState {
        SubmissionState::Received
    }

    fn transition(
        &self,
        current: SubmissionState,
        event: SubmissionEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_submission(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> SubmissionState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: SubmissionState,
        event: SubmissionEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }
}

impl Default for FlowEngine<IncidentSubmissionFlow> {
    fn default() -> Self {
        Self::new(IncidentSubmissionFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("submission already finished in {state:?}; cannot apply {event:?}")]
    Terminal { state: SubmissionState, event: SubmissionEvent },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: SubmissionState, event: SubmissionEvent },
}

fn transition_submission(
    current: SubmissionState,
    event: SubmissionEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use SubmissionEvent::{
        AckSent, ConfirmationPublished, ContextStepFinished, IdentityStepFinished, LinkBackfilled,
        RecordCreationFailed, ValidationFailed,
    };
    use SubmissionState::{
        Acknowledged, Confirmed, ContextGathered, Failed, IdentityResolved, Linked, Received,
        RecordCreated, Rejected,
    };

    if current.is_terminal() {
        return Err(FlowTransitionError::Terminal { state: current, event });
    }

    let to = match (current, event) {
        (Received, ValidationFailed) => Rejected,
        (Received, AckSent) => Acknowledged,
        (Acknowledged, IdentityStepFinished) => IdentityResolved,
        (IdentityResolved, ContextStepFinished) => ContextGathered,
        (ContextGathered, SubmissionEvent::RecordCreated) => RecordCreated,
        (ContextGathered, RecordCreationFailed) => Failed,
        (RecordCreated, ConfirmationPublished) => Confirmed,
        (Confirmed, LinkBackfilled) => Linked,
        _ => return Err(FlowTransitionError::InvalidTransition { state: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event })
}
