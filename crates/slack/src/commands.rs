//! `/incident` and the "Report as incident" message action: both just open the modal.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use incident_core::TeamDirectory;
use tracing::{error, info, warn};

use crate::blocks::open_form_failure_text;
use crate::client::{ChatPlatform, SlackApiError};
use crate::events::{
    Ack, AckResponse, EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEvent,
    SlackEventType,
};
use crate::modal::{incident_modal, ModalPrefill};
use crate::payloads::{INCIDENT_COMMAND, REPORT_MESSAGE_CALLBACK};

/// Opens the incident modal with team options from the live snapshot.
pub struct ModalLauncher {
    chat: Arc<dyn ChatPlatform>,
    teams: Arc<dyn TeamDirectory>,
    timezone: Tz,
}

impl ModalLauncher {
    pub fn new(chat: Arc<dyn ChatPlatform>, teams: Arc<dyn TeamDirectory>, timezone: Tz) -> Self {
        Self { chat, teams, timezone }
    }

    pub async fn open(&self, trigger_id: &str, prefill: &ModalPrefill) -> Result<(), SlackApiError> {
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let view = incident_modal(today, &self.teams.snapshot(), prefill);
        self.chat.open_view(trigger_id, &view).await
    }

    /// Tells the user the modal could not be opened. Failure here is only logged.
    async fn report_failure(&self, channel_id: &str, user_id: &str, failure: &SlackApiError, ctx: &EventContext) {
        error!(
            event_name = "slack.modal_open_failed",
            correlation_id = %ctx.correlation_id,
            user_id,
            error = %failure,
            "could not open incident modal"
        );
        let text = open_form_failure_text(&failure.to_string());
        if let Err(notify_error) = self.chat.post_ephemeral(channel_id, user_id, &text).await {
            warn!(
                event_name = "slack.modal_failure_notice_failed",
                correlation_id = %ctx.correlation_id,
                user_id,
                error = %notify_error,
                "could not tell the user the modal failed"
            );
        }
    }
}

pub struct IncidentCommandHandler {
    launcher: Arc<ModalLauncher>,
}

impl IncidentCommandHandler {
    pub fn new(launcher: Arc<ModalLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl EventHandler for IncidentCommandHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        event: SlackEvent,
        ack: Ack,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(command) = event else {
            return Ok(HandlerResult::Ignored);
        };
        ack.send(AckResponse::Empty);
        if command.command != INCIDENT_COMMAND {
            return Ok(HandlerResult::Ignored);
        }

        info!(
            event_name = "slack.incident_command",
            correlation_id = %ctx.correlation_id,
            user_id = %command.user_id,
            channel_id = %command.channel_id,
            "opening incident modal"
        );
        if let Err(failure) = self.launcher.open(&command.trigger_id, &ModalPrefill::default()).await {
            self.launcher.report_failure(&command.channel_id, &command.user_id, &failure, ctx).await;
        }
        Ok(HandlerResult::Processed)
    }
}

pub struct ReportMessageHandler {
    launcher: Arc<ModalLauncher>,
}

impl ReportMessageHandler {
    pub fn new(launcher: Arc<ModalLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl EventHandler for ReportMessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::MessageAction
    }

    async fn handle(
        &self,
        event: SlackEvent,
        ack: Ack,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::MessageAction(action) = event else {
            return Ok(HandlerResult::Ignored);
        };
        ack.send(AckResponse::Empty);
        if action.callback_id != REPORT_MESSAGE_CALLBACK {
            return Ok(HandlerResult::Ignored);
        }

        let metadata = action.source_metadata();
        info!(
            event_name = "slack.report_message",
            correlation_id = %ctx.correlation_id,
            user_id = %action.user_id,
            channel_id = %action.channel_id,
            message_ts = %action.message_ts,
            "opening incident modal from message"
        );
        let prefill = ModalPrefill::from_message(&action.text, metadata);
        if let Err(failure) = self.launcher.open(&action.trigger_id, &prefill).await {
            self.launcher.report_failure(&action.channel_id, &action.user_id, &failure, ctx).await;
        }
        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono_tz::Tz;
    use incident_core::{SourceMetadata, StaticTeamDirectory, Team};
    use tokio::sync::Mutex;

    use super::{IncidentCommandHandler, ModalLauncher, ReportMessageHandler};
    use crate::blocks::MessageTemplate;
    use crate::client::{
        AuthIdentity, ChatPlatform, ConversationReplies, PostedMessage, SlackApiError, UserProfile,
    };
    use crate::events::{Ack, AckResponse, EventContext, EventDispatcher, HandlerResult, SlackEvent};
    use crate::modal::{ids, ModalView};
    use crate::payloads::{MessageActionPayload, SlashCommandPayload};

    #[derive(Default)]
    struct ModalRecorder {
        fail_open: bool,
        views: Mutex<Vec<(String, ModalView)>>,
        ephemerals: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl ChatPlatform for ModalRecorder {
        async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
            if self.fail_open {
                return Err(SlackApiError::Api { method: "views.open".to_string(), error: "expired_trigger_id".to_string() });
            }
            self.views.lock().await.push((trigger_id.to_string(), view.clone()));
            Ok(())
        }
        async fn post_message(&self, _: &str, _: Option<&str>, _: &MessageTemplate) -> Result<PostedMessage, SlackApiError> {
            Err(SlackApiError::Transport("unused".to_string()))
        }
        async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<(), SlackApiError> {
            self.ephemerals.lock().await.push((channel.to_string(), user.to_string(), text.to_string()));
            Ok(())
        }
        async fn user_info(&self, _: &str) -> Result<UserProfile, SlackApiError> {
            Err(SlackApiError::Transport("unused".to_string()))
        }
        async fn conversation_replies(&self, _: &str, _: &str, _: u32) -> Result<ConversationReplies, SlackApiError> {
            Err(SlackApiError::Transport("unused".to_string()))
        }
        async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
            Err(SlackApiError::Transport("unused".to_string()))
        }
    }

    fn dispatcher(chat: Arc<ModalRecorder>) -> EventDispatcher {
        let teams = Arc::new(StaticTeamDirectory::new(vec![Team { id: "t1".to_string(), name: "Platform".to_string() }]));
        let launcher = Arc::new(ModalLauncher::new(chat, teams, Tz::UTC));
        EventDispatcher::new()
            .with_handler(Arc::new(IncidentCommandHandler::new(launcher.clone())))
            .with_handler(Arc::new(ReportMessageHandler::new(launcher)))
    }

    fn command() -> SlackEvent {
        SlackEvent::SlashCommand(SlashCommandPayload {
            command: "/incident".to_string(),
            text: String::new(),
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            trigger_id: "trig-1".to_string(),
        })
    }

    #[tokio::test]
    async fn slash_command_acks_then_opens_modal_with_teams() {
        let chat = Arc::new(ModalRecorder::default());
        let (ack, received) = Ack::channel();

        let result = dispatcher(chat.clone()).dispatch(command(), ack, &EventContext::default()).await;

        assert_eq!(result.expect("dispatch"), HandlerResult::Processed);
        assert_eq!(received.await.expect("acked"), AckResponse::Empty);
        let views = chat.views.lock().await;
        assert_eq!(views[0].0, "trig-1");
        assert!(views[0].1.block(ids::TEAMS.0).is_some());
        assert_eq!(views[0].1.private_metadata, None);
    }

    #[tokio::test]
    async fn failed_modal_open_posts_ephemeral_error() {
        let chat = Arc::new(ModalRecorder { fail_open: true, ..ModalRecorder::default() });
        let (ack, _) = Ack::channel();

        dispatcher(chat.clone()).dispatch(command(), ack, &EventContext::default()).await.expect("dispatch");

        let ephemerals = chat.ephemerals.lock().await;
        assert_eq!(ephemerals.len(), 1);
        assert_eq!(ephemerals[0].0, "C1");
        assert!(ephemerals[0].2.starts_with("❌ Failed to open incident form:"));
    }

    #[tokio::test]
    async fn message_action_carries_source_metadata() {
        let chat = Arc::new(ModalRecorder::default());
        let (ack, _) = Ack::channel();
        let event = SlackEvent::MessageAction(MessageActionPayload {
            callback_id: "report_as_incident".to_string(),
            trigger_id: "trig-2".to_string(),
            user_id: "U1".to_string(),
            channel_id: "C7".to_string(),
            message_ts: "1.5".to_string(),
            thread_ts: Some("1.0".to_string()),
            text: "db is slow".to_string(),
        });

        dispatcher(chat.clone()).dispatch(event, ack, &EventContext::default()).await.expect("dispatch");

        let views = chat.views.lock().await;
        let metadata = views[0].1.private_metadata.as_deref().and_then(SourceMetadata::parse).expect("metadata");
        assert_eq!(metadata.source_channel_id.as_deref(), Some("C7"));
        assert_eq!(metadata.source_thread_ts.as_deref(), Some("1.0"));
    }

    #[tokio::test]
    async fn other_commands_are_ignored_after_ack() {
        let chat = Arc::new(ModalRecorder::default());
        let (ack, received) = Ack::channel();
        let event = SlackEvent::SlashCommand(SlashCommandPayload {
            command: "/other".to_string(),
            text: String::new(),
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            trigger_id: "t".to_string(),
        });

        let result = dispatcher(chat.clone()).dispatch(event, ack, &EventContext::default()).await;

        assert_eq!(result.expect("dispatch"), HandlerResult::Ignored);
        assert_eq!(received.await.expect("acked"), AckResponse::Empty);
        assert!(chat.views.lock().await.is_empty());
    }
}
