use std::fmt;

use thiserror::Error;

use crate::flows::FlowTransitionError;

/// Modal inputs a validation error can point at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormField {
    Title,
    Description,
    Severity,
    Area,
    HappenedDate,
    DiscoverDate,
    DueDate,
    WhyItMatters,
    Teams,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: FormField,
    pub message: String,
}

impl FieldError {
    pub fn new(field: FormField, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invalid field(s):", self.errors.len())?;
        for error in &self.errors {
            write!(f, " {:?}: {};", error.field, error.message)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("document store failure: {0}")]
    DocumentStore(String),
    #[error("chat platform failure: {0}")]
    ChatPlatform(String),
    #[error("`{step}` did not finish within {timeout_secs}s")]
    Timeout { step: String, timeout_secs: u64 },
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The incident could not be processed. Check the form values and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "Notion or Slack is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    /// Text for the DM sent when an incident could not be created.
    pub fn submission_failure_text(&self) -> String {
        format!(
            "Sorry, there was an error creating the incident: {} (ref `{}`)",
            self.user_message(),
            self.correlation_id()
        )
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::DocumentStore(message) | ApplicationError::ChatPlatform(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            error @ ApplicationError::Timeout { .. } => Self::ServiceUnavailable {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{
        ApplicationError, DomainError, FieldError, FormField, InterfaceError, ValidationError,
    };

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::from(ValidationError {
            errors: vec![FieldError::new(FormField::Title, "This field is required.")],
        }))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn document_store_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::DocumentStore("notion returned 502".to_owned()).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "Notion or Slack is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn timeout_maps_to_service_unavailable_with_step_name() {
        let interface = ApplicationError::Timeout { step: "create_record".to_owned(), timeout_secs: 10 }
            .into_interface("req-3");

        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable { ref message, .. } if message.contains("create_record")
        ));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing database id".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn failure_text_hides_details_but_carries_reference() {
        let interface = ApplicationError::DocumentStore("validation_error: Title is not a property".to_owned())
            .into_interface("req-5");
        let text = interface.submission_failure_text();

        assert!(text.starts_with("Sorry, there was an error creating the incident:"));
        assert!(text.contains("req-5"));
        assert!(!text.contains("validation_error"));
    }
}
