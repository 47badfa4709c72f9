pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use domain::incident::{
    page_url, Area, CreatedIncident, Destination, IncidentFormData, IncidentFormInput,
    IncidentStatus, Severity, SourceMetadata, ThreadMessage, ThreadMessagesResult, TriggerKind,
    UnassignedIncident, ValidatedForm,
};
pub use domain::team::{StaticTeamDirectory, Team, TeamDirectory, TeamsSnapshot};
pub use errors::{
    ApplicationError, DomainError, FieldError, FormField, InterfaceError, ValidationError,
};
