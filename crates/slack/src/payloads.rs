//! Decoding of Slack's inbound request bodies into typed events.

use std::collections::HashMap;

use incident_core::{IncidentFormInput, SourceMetadata};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::events::SlackEvent;
use crate::modal::ids;

pub const INCIDENT_COMMAND: &str = "/incident";
pub const REPORT_MESSAGE_CALLBACK: &str = "report_as_incident";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("request body carries neither `command` nor `payload`")]
    UnrecognizedBody,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid json payload: {0}")]
    InvalidJson(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageActionPayload {
    pub callback_id: String,
    pub trigger_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub message_ts: String,
    pub thread_ts: Option<String>,
    pub text: String,
}

impl MessageActionPayload {
    /// Metadata stored in the modal; the thread defaults to the message itself.
    pub fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            source_channel_id: Some(self.channel_id.clone()),
            source_message_ts: Some(self.message_ts.clone()),
            source_thread_ts: Some(self.thread_ts.clone().unwrap_or_else(|| self.message_ts.clone())),
        }
    }
}

/// One answered input inside `view.state.values[block_id][action_id]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ActionValue {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub selected_option: Option<SelectedOption>,
    #[serde(default)]
    pub selected_options: Option<Vec<SelectedOption>>,
    #[serde(default)]
    pub selected_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SelectedOption {
    pub value: String,
}

pub type StateValues = HashMap<String, HashMap<String, ActionValue>>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewSubmissionPayload {
    pub callback_id: String,
    pub user_id: String,
    pub user_name: String,
    pub private_metadata: String,
    pub values: StateValues,
}

impl ViewSubmissionPayload {
    fn action(&self, (block_id, action_id): (&str, &str)) -> Option<&ActionValue> {
        self.values.get(block_id)?.get(action_id)
    }

    fn text(&self, id: (&str, &str)) -> Option<String> {
        non_blank(self.action(id)?.value.clone())
    }

    fn selected(&self, id: (&str, &str)) -> Option<String> {
        non_blank(self.action(id)?.selected_option.as_ref().map(|option| option.value.clone()))
    }

    fn date(&self, id: (&str, &str)) -> Option<String> {
        non_blank(self.action(id)?.selected_date.clone())
    }

    /// Reads every modal input by its fixed ids. Unanswered inputs are `None`.
    pub fn form_input(&self) -> IncidentFormInput {
        IncidentFormInput {
            title: self.text(ids::TITLE),
            description: self.text(ids::DESCRIPTION),
            severity: self.selected(ids::SEVERITY),
            area: self.selected(ids::AREA),
            happened_date: self.date(ids::HAPPENED_DATE),
            discover_date: self.date(ids::DISCOVER_DATE),
            due_date: self.date(ids::DUE_DATE),
            why_it_matters: self.text(ids::WHY_IT_MATTERS),
            team_ids: self
                .action(ids::TEAMS)
                .and_then(|action| action.selected_options.as_ref())
                .map(|options| options.iter().map(|option| option.value.clone()).collect())
                .unwrap_or_default(),
        }
    }

    pub fn metadata(&self) -> Option<SourceMetadata> {
        SourceMetadata::parse(&self.private_metadata)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Decodes a form-encoded request: slash commands arrive as plain fields,
/// interactivity as a JSON document in the `payload` field.
pub fn parse_form(form: &HashMap<String, String>) -> Result<SlackEvent, PayloadError> {
    if let Some(payload) = form.get("payload") {
        return parse_interaction(payload);
    }
    if form.contains_key("command") {
        let field = |name: &'static str| form.get(name).cloned().ok_or(PayloadError::MissingField(name));
        return Ok(SlackEvent::SlashCommand(SlashCommandPayload {
            command: field("command")?,
            text: form.get("text").cloned().unwrap_or_default(),
            channel_id: field("channel_id")?,
            user_id: field("user_id")?,
            trigger_id: field("trigger_id")?,
        }));
    }
    Err(PayloadError::UnrecognizedBody)
}

/// Decodes an Events API JSON body. Only `url_verification` is acted on.
pub fn parse_json(body: &[u8]) -> Result<SlackEvent, PayloadError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|error| PayloadError::InvalidJson(error.to_string()))?;
    match value.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = value
                .get("challenge")
                .and_then(Value::as_str)
                .ok_or(PayloadError::MissingField("challenge"))?;
            Ok(SlackEvent::UrlVerification { challenge: challenge.to_string() })
        }
        Some(kind) => Ok(SlackEvent::Unsupported { kind: kind.to_string() }),
        None => Err(PayloadError::MissingField("type")),
    }
}

#[derive(Deserialize)]
struct Interaction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    callback_id: Option<String>,
    #[serde(default)]
    trigger_id: Option<String>,
    #[serde(default)]
    user: Option<InteractionUser>,
    #[serde(default)]
    channel: Option<InteractionChannel>,
    #[serde(default)]
    message: Option<InteractionMessage>,
    #[serde(default)]
    view: Option<InteractionView>,
}

#[derive(Deserialize)]
struct InteractionUser {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize)]
struct InteractionChannel {
    id: String,
}

#[derive(Deserialize)]
struct InteractionMessage {
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct InteractionView {
    #[serde(default)]
    callback_id: String,
    #[serde(default)]
    private_metadata: String,
    #[serde(default)]
    state: ViewState,
}

#[derive(Default, Deserialize)]
struct ViewState {
    #[serde(default)]
    values: StateValues,
}

fn parse_interaction(raw: &str) -> Result<SlackEvent, PayloadError> {
    let interaction: Interaction =
        serde_json::from_str(raw).map_err(|error| PayloadError::InvalidJson(error.to_string()))?;
    let user = interaction.user.ok_or(PayloadError::MissingField("user"))?;

    match interaction.kind.as_str() {
        "message_action" => {
            let message = interaction.message.ok_or(PayloadError::MissingField("message"))?;
            Ok(SlackEvent::MessageAction(MessageActionPayload {
                callback_id: interaction.callback_id.unwrap_or_default(),
                trigger_id: interaction.trigger_id.ok_or(PayloadError::MissingField("trigger_id"))?,
                user_id: user.id,
                channel_id: interaction.channel.ok_or(PayloadError::MissingField("channel"))?.id,
                message_ts: message.ts,
                thread_ts: message.thread_ts,
                text: message.text.unwrap_or_default(),
            }))
        }
        "view_submission" => {
            let view = interaction.view.ok_or(PayloadError::MissingField("view"))?;
            let user_name = user.name.or(user.username).unwrap_or_else(|| user.id.clone());
            Ok(SlackEvent::ViewSubmission(ViewSubmissionPayload {
                callback_id: view.callback_id,
                user_id: user.id,
                user_name,
                private_metadata: view.private_metadata,
                values: view.state.values,
            }))
        }
        other => Ok(SlackEvent::Unsupported { kind: other.to_string() }),
    }
}
