use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use incident_core::ValidationError;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::client::SlackApiError;
use crate::modal::{self, block_id_for};
use crate::payloads::{MessageActionPayload, SlashCommandPayload, ViewSubmissionPayload};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    UrlVerification { challenge: String },
    SlashCommand(SlashCommandPayload),
    MessageAction(MessageActionPayload),
    ViewSubmission(ViewSubmissionPayload),
    /// Anything the bot does not act on; acknowledged and dropped.
    Unsupported { kind: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    UrlVerification,
    SlashCommand,
    MessageAction,
    ViewSubmission,
    Unsupported,
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::UrlVerification { .. } => SlackEventType::UrlVerification,
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::MessageAction(_) => SlackEventType::MessageAction,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Slack user that triggered the event, when there is one.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(command) => Some(&command.user_id),
            Self::MessageAction(action) => Some(&action.user_id),
            Self::ViewSubmission(submission) => Some(&submission.user_id),
            Self::UrlVerification { .. } | Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Body of the HTTP response Slack waits for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckResponse {
    Empty,
    Challenge(String),
    /// `response_action: errors`, keyed by modal block id.
    ValidationErrors(BTreeMap<String, String>),
}

impl AckResponse {
    pub fn validation_errors(error: &ValidationError) -> Self {
        let mut errors = BTreeMap::new();
        for field_error in &error.errors {
            errors
                .entry(block_id_for(field_error.field).to_string())
                .or_insert_with(|| field_error.message.clone());
        }
        Self::ValidationErrors(errors)
    }

    /// `None` means an empty 200.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::Challenge(challenge) => Some(json!({"challenge": challenge})),
            Self::ValidationErrors(errors) => Some(json!({"response_action": "errors", "errors": errors})),
        }
    }
}

/// Single-use acknowledgment. Dropping an unsent `Ack` sends an empty one so
/// Slack never waits on a handler that bailed out early.
pub struct Ack {
    responder: Option<Box<dyn FnOnce(AckResponse) + Send>>,
}

impl Ack {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnOnce(AckResponse) + Send + 'static,
    {
        Self { responder: Some(Box::new(responder)) }
    }

    /// Ack wired to a oneshot; the receiver resolves on the first send.
    pub fn channel() -> (Self, oneshot::Receiver<AckResponse>) {
        let (sender, receiver) = oneshot::channel();
        let ack = Self::new(move |response| {
            let _ = sender.send(response);
        });
        (ack, receiver)
    }

    pub fn send(mut self, response: AckResponse) {
        if let Some(responder) = self.responder.take() {
            responder(response);
        }
    }
}

impl Drop for Ack {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.take() {
            responder(AckResponse::Empty);
        }
    }
}

impl std::fmt::Debug for Ack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ack").field("sent", &self.responder.is_none()).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error("submission failed: {0}")]
    Submission(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler for {event_type:?} failed: {source}")]
    Handler { event_type: SlackEventType, source: EventHandlerError },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;

    async fn handle(
        &self,
        event: SlackEvent,
        ack: Ack,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.event_type(), handler);
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Runs the handler to completion. The ack is released as soon as the
    /// handler sends it; unhandled events are acked empty.
    pub async fn dispatch(
        &self,
        event: SlackEvent,
        ack: Ack,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let event_type = event.event_type();
        let Some(handler) = self.handlers.get(&event_type) else {
            debug!(
                event_name = "slack.event_ignored",
                correlation_id = %ctx.correlation_id,
                event_type = ?event_type,
                "no handler registered"
            );
            ack.send(AckResponse::Empty);
            return Ok(HandlerResult::Ignored);
        };

        handler
            .handle(event, ack, ctx)
            .await
            .map_err(|source| DispatchError::Handler { event_type, source })
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub struct UrlVerificationHandler;

#[async_trait]
impl EventHandler for UrlVerificationHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::UrlVerification
    }

    async fn handle(
        &self,
        event: SlackEvent,
        ack: Ack,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::UrlVerification { challenge } = event else {
            return Ok(HandlerResult::Ignored);
        };
        ack.send(AckResponse::Challenge(challenge));
        Ok(HandlerResult::Processed)
    }
}

/// Owns a submitted incident modal from acknowledgment onward.
#[async_trait]
pub trait SubmissionService: Send + Sync {
    async fn submit(
        &self,
        submission: ViewSubmissionPayload,
        ack: Ack,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

pub struct ViewSubmissionHandler<S> {
    service: S,
}

impl<S> ViewSubmissionHandler<S>
where
    S: SubmissionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ViewSubmissionHandler<S>
where
    S: SubmissionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        event: SlackEvent,
        ack: Ack,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(submission) = event else {
            return Ok(HandlerResult::Ignored);
        };
        if submission.callback_id != modal::CALLBACK_ID {
            ack.send(AckResponse::Empty);
            return Ok(HandlerResult::Ignored);
        }
        self.service.submit(submission, ack, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use incident_core::{FieldError, FormField, ValidationError};
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{
        Ack, AckResponse, EventContext, EventDispatcher, EventHandlerError, HandlerResult,
        SlackEvent, SubmissionService, UrlVerificationHandler, ViewSubmissionHandler,
    };
    use crate::payloads::ViewSubmissionPayload;

    #[derive(Default)]
    struct RecordingSubmissions {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SubmissionService for Arc<RecordingSubmissions> {
        async fn submit(
            &self,
            submission: ViewSubmissionPayload,
            ack: Ack,
            _ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            ack.send(AckResponse::Empty);
            self.seen.lock().await.push(submission.user_id);
            Ok(())
        }
    }

    fn submission(callback_id: &str) -> SlackEvent {
        SlackEvent::ViewSubmission(ViewSubmissionPayload {
            callback_id: callback_id.to_string(),
            user_id: "U1".to_string(),
            ..ViewSubmissionPayload::default()
        })
    }

    #[tokio::test]
    async fn dispatcher_routes_url_verification() {
        let dispatcher = EventDispatcher::new().with_handler(Arc::new(UrlVerificationHandler));
        let (ack, received) = Ack::channel();

        let result = dispatcher
            .dispatch(SlackEvent::UrlVerification { challenge: "abc".to_string() }, ack, &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(received.await.expect("acked"), AckResponse::Challenge("abc".to_string()));
    }

    #[tokio::test]
    async fn dispatcher_acks_empty_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let (ack, received) = Ack::channel();

        let result = dispatcher
            .dispatch(SlackEvent::Unsupported { kind: "block_actions".to_string() }, ack, &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(received.await.expect("acked"), AckResponse::Empty);
    }

    #[tokio::test]
    async fn view_submissions_for_other_modals_are_not_submitted() {
        let service = Arc::new(RecordingSubmissions::default());
        let dispatcher =
            EventDispatcher::new().with_handler(Arc::new(ViewSubmissionHandler::new(service.clone())));

        let (ack, _) = Ack::channel();
        let ignored = dispatcher.dispatch(submission("other_modal"), ack, &EventContext::default()).await;
        let (ack, _) = Ack::channel();
        let processed = dispatcher.dispatch(submission("incident_modal"), ack, &EventContext::default()).await;

        assert_eq!(ignored.expect("dispatch"), HandlerResult::Ignored);
        assert_eq!(processed.expect("dispatch"), HandlerResult::Processed);
        assert_eq!(*service.seen.lock().await, vec!["U1".to_string()]);
        assert_eq!(dispatcher.handler_count(), 1);
    }

    #[tokio::test]
    async fn dropped_ack_releases_an_empty_response() {
        let (ack, received) = Ack::channel();
        drop(ack);
        assert_eq!(received.await.expect("acked on drop"), AckResponse::Empty);
    }

    #[test]
    fn validation_errors_are_keyed_by_block_id() {
        let error = ValidationError {
            errors: vec![
                FieldError::new(FormField::Title, "This field is required."),
                FieldError::new(FormField::Severity, "Please choose an option."),
            ],
        };

        let body = AckResponse::validation_errors(&error).to_json();

        assert_eq!(
            body,
            Some(json!({
                "response_action": "errors",
                "errors": {
                    "severity_block": "Please choose an option.",
                    "title_block": "This field is required."
                }
            }))
        );
        assert_eq!(AckResponse::Empty.to_json(), None);
    }
}
