use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{FieldError, FormField, ValidationError};

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 3000;
pub const WHY_IT_MATTERS_MAX_CHARS: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "ASAP")]
    Asap,
    High,
    Normal,
    Low,
}

impl Severity {
    /// Most urgent first. Digest grouping and modal option order follow this.
    pub const ALL: [Severity; 4] = [Self::Asap, Self::High, Self::Normal, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asap => "ASAP",
            Self::High => "High",
            Self::Normal => "Normal",
            Self::Low => "Low",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Asap => "⚡",
            Self::High => "🟠",
            Self::Normal => "🟡",
            Self::Low => "🟢",
        }
    }

    /// Emoji for a severity read back from the store, which may hold values we do not know.
    pub fn emoji_for(raw: Option<&str>) -> &'static str {
        raw.and_then(|value| value.parse::<Self>().ok()).map(Self::emoji).unwrap_or("⚪")
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|severity| severity.as_str() == value)
            .ok_or_else(|| UnknownVariant { kind: "severity", value: value.to_string() })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Area {
    Client,
    Internal,
    Process,
    People,
    #[serde(rename = "Client Communication")]
    ClientCommunication,
}

impl Area {
    pub const ALL: [Area; 5] =
        [Self::Client, Self::Internal, Self::Process, Self::People, Self::ClientCommunication];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Internal => "Internal",
            Self::Process => "Process",
            Self::People => "People",
            Self::ClientCommunication => "Client Communication",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Area {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|area| area.as_str() == value)
            .ok_or_else(|| UnknownVariant { kind: "area", value: value.to_string() })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Ready for Review")]
    ReadyForReview,
    Resolved,
}

impl IncidentStatus {
    /// Statuses that still need an owner to drive them.
    pub const UNRESOLVED: [IncidentStatus; 3] =
        [Self::Open, Self::InProgress, Self::ReadyForReview];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::ReadyForReview => "Ready for Review",
            Self::Resolved => "Resolved",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    SlashCommand,
    MessageAction,
}

impl TriggerKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::SlashCommand => "Slack /incident command",
            Self::MessageAction => "Slack message action",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Values read out of a submitted modal before any validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncidentFormInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub area: Option<String>,
    pub happened_date: Option<String>,
    pub discover_date: Option<String>,
    pub due_date: Option<String>,
    pub why_it_matters: Option<String>,
    pub team_ids: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedForm {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub area: Area,
    pub happened_date: Option<NaiveDate>,
    pub discover_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub why_it_matters: Option<String>,
    pub team_ids: Vec<String>,
}

impl IncidentFormInput {
    /// Collects every field problem at once so the modal can flag them together.
    pub fn validate(self) -> Result<ValidatedForm, ValidationError> {
        let mut errors = Vec::new();

        let title = required_text(self.title, FormField::Title, TITLE_MAX_CHARS, &mut errors);
        let description = required_text(
            self.description,
            FormField::Description,
            DESCRIPTION_MAX_CHARS,
            &mut errors,
        );
        let severity = required_choice::<Severity>(self.severity, FormField::Severity, &mut errors);
        let area = required_choice::<Area>(self.area, FormField::Area, &mut errors);
        let happened_date = optional_date(self.happened_date, FormField::HappenedDate, &mut errors);
        let discover_date = optional_date(self.discover_date, FormField::DiscoverDate, &mut errors);
        let due_date = optional_date(self.due_date, FormField::DueDate, &mut errors);

        let why_it_matters = non_blank(self.why_it_matters);
        if let Some(text) = &why_it_matters {
            if text.chars().count() > WHY_IT_MATTERS_MAX_CHARS {
                errors.push(FieldError::new(
                    FormField::WhyItMatters,
                    format!("Keep this under {WHY_IT_MATTERS_MAX_CHARS} characters."),
                ));
            }
        }

        let team_ids = self.team_ids.into_iter().filter(|id| !id.trim().is_empty()).collect();

        match (title, description, severity, area) {
            (Some(title), Some(description), Some(severity), Some(area)) if errors.is_empty() => {
                Ok(ValidatedForm {
                    title,
                    description,
                    severity,
                    area,
                    happened_date,
                    discover_date,
                    due_date,
                    why_it_matters,
                    team_ids,
                })
            }
            _ => Err(ValidationError { errors }),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

fn required_text(
    value: Option<String>,
    field: FormField,
    max_chars: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let Some(text) = non_blank(value) else {
        errors.push(FieldError::new(field, "This field is required."));
        return None;
    };
    if text.chars().count() > max_chars {
        errors.push(FieldError::new(field, format!("Keep this under {max_chars} characters.")));
        return None;
    }
    Some(text)
}

fn required_choice<T>(
    value: Option<String>,
    field: FormField,
    errors: &mut Vec<FieldError>,
) -> Option<T>
where
    T: FromStr,
{
    let Some(raw) = non_blank(value) else {
        errors.push(FieldError::new(field, "Please choose an option."));
        return None;
    };
    match raw.parse::<T>() {
        Ok(choice) => Some(choice),
        Err(_) => {
            errors.push(FieldError::new(field, format!("`{raw}` is not a known option.")));
            None
        }
    }
}

fn optional_date(
    value: Option<String>,
    field: FormField,
    errors: &mut Vec<FieldError>,
) -> Option<NaiveDate> {
    let raw = non_blank(value)?;
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(FieldError::new(field, "Use a YYYY-MM-DD date."));
            None
        }
    }
}

/// Everything needed to write one incident record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncidentFormData {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub area: Area,
    pub created_by: String,
    pub created_by_name: String,
    pub slack_channel_id: String,
    pub reporter_notion_id: Option<String>,
    pub happened_date: Option<NaiveDate>,
    pub discover_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub why_it_matters: Option<String>,
    pub team_ids: Vec<String>,
    pub trigger: TriggerKind,
}

impl IncidentFormData {
    pub fn new(
        form: ValidatedForm,
        created_by: impl Into<String>,
        created_by_name: impl Into<String>,
        slack_channel_id: impl Into<String>,
        trigger: TriggerKind,
    ) -> Self {
        Self {
            title: form.title,
            description: form.description,
            severity: form.severity,
            area: form.area,
            created_by: created_by.into(),
            created_by_name: created_by_name.into(),
            slack_channel_id: slack_channel_id.into(),
            reporter_notion_id: None,
            happened_date: form.happened_date,
            discover_date: form.discover_date,
            due_date: form.due_date,
            why_it_matters: form.why_it_matters,
            team_ids: form.team_ids,
            trigger,
        }
    }
}

/// The `private_metadata` carried by a modal opened from a message action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_thread_ts: Option<String>,
}

impl SourceMetadata {
    /// `None` means the modal came from the slash command.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        serde_json::from_str::<Self>(raw).ok().filter(|metadata| metadata.source_channel_id.is_some())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Thread the incident was reported from, falling back to the message itself.
    pub fn thread_ts(&self) -> Option<&str> {
        self.source_thread_ts.as_deref().or(self.source_message_ts.as_deref())
    }

    /// Channel and thread to read replies from.
    pub fn thread_reference(&self) -> Option<(&str, &str)> {
        Some((self.source_channel_id.as_deref()?, self.thread_ts()?))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    ChannelThread { channel_id: String, thread_ts: Option<String> },
    DirectMessage { user_id: String },
}

impl Destination {
    /// Public and shared channels (`C…`) get a threaded reply; everything else,
    /// including private channels and DMs, falls back to the submitter's DM.
    pub fn resolve(metadata: Option<&SourceMetadata>, submitter_id: &str) -> Self {
        match metadata.and_then(|meta| meta.source_channel_id.as_deref().map(|id| (id, meta))) {
            Some((channel_id, meta)) if channel_id.starts_with('C') => Self::ChannelThread {
                channel_id: channel_id.to_string(),
                thread_ts: meta.thread_ts().map(str::to_string),
            },
            _ => Self::DirectMessage { user_id: submitter_id.to_string() },
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Self::ChannelThread { channel_id, .. } => channel_id,
            Self::DirectMessage { user_id } => user_id,
        }
    }

    pub fn thread_ts(&self) -> Option<&str> {
        match self {
            Self::ChannelThread { thread_ts, .. } => thread_ts.as_deref(),
            Self::DirectMessage { .. } => None,
        }
    }

    pub fn is_channel_thread(&self) -> bool {
        matches!(self, Self::ChannelThread { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub user: String,
    pub user_name: String,
    pub text: String,
    pub timestamp: String,
    pub formatted_time: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessagesResult {
    pub messages: Vec<ThreadMessage>,
    pub total_count: usize,
    pub has_more: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIncident {
    pub id: String,
    pub url: String,
}

impl CreatedIncident {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let url = page_url(&id);
        Self { id, url }
    }

    pub fn short_id(&self) -> &str {
        let end = self.id.char_indices().nth(8).map(|(index, _)| index).unwrap_or(self.id.len());
        &self.id[..end]
    }
}

pub fn page_url(page_id: &str) -> String {
    format!("https://notion.so/{}", page_id.replace('-', ""))
}

/// An open incident nobody has taken ownership of yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedIncident {
    pub id: String,
    pub url: String,
    pub title: String,
    pub severity: Option<String>,
    pub area: Option<String>,
    pub status: Option<String>,
    pub discover_date: Option<NaiveDate>,
    pub team_ids: Vec<String>,
}
