use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    Received,
    Acknowledged,
    Rejected,
    IdentityResolved,
    ContextGathered,
    RecordCreated,
    Failed,
    Confirmed,
    Linked,
}

impl SubmissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Failed | Self::Linked)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionEvent {
    AckSent,
    ValidationFailed,
    IdentityStepFinished,
    ContextStepFinished,
    RecordCreated,
    RecordCreationFailed,
    ConfirmationPublished,
    LinkBackfilled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: SubmissionState,
    pub to: SubmissionState,
    pub event: SubmissionEvent,
}
