pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, IncidentSubmissionFlow};
pub use states::{SubmissionEvent, SubmissionState, TransitionOutcome};
