//! The incident intake modal and the block/action ids its answers come back under.

use chrono::NaiveDate;
use incident_core::domain::incident::{DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS, WHY_IT_MATTERS_MAX_CHARS};
use incident_core::errors::FormField;
use incident_core::{Area, Severity, SourceMetadata, TeamsSnapshot};
use serde::Serialize;

use crate::blocks::{Block, InputElement, OptionObject, TextObject};

pub const CALLBACK_ID: &str = "incident_modal";

/// `(block_id, action_id)` for every input in the modal.
pub mod ids {
    pub const TITLE: (&str, &str) = ("title_block", "title_input");
    pub const DESCRIPTION: (&str, &str) = ("description_block", "description_input");
    pub const SEVERITY: (&str, &str) = ("severity_block", "severity_input");
    pub const AREA: (&str, &str) = ("area_block", "area_input");
    pub const HAPPENED_DATE: (&str, &str) = ("happened_date_block", "happened_date_input");
    pub const DISCOVER_DATE: (&str, &str) = ("discover_date_block", "discover_date_input");
    pub const DUE_DATE: (&str, &str) = ("due_date_block", "due_date_input");
    pub const WHY_IT_MATTERS: (&str, &str) = ("why_it_matters_block", "why_it_matters_input");
    pub const TEAMS: (&str, &str) = ("teams_block", "teams_input");
}

/// Block id a validation error for `field` should be attached to.
pub fn block_id_for(field: FormField) -> &'static str {
    let (block_id, _) = match field {
        FormField::Title => ids::TITLE,
        FormField::Description => ids::DESCRIPTION,
        FormField::Severity => ids::SEVERITY,
        FormField::Area => ids::AREA,
        FormField::HappenedDate => ids::HAPPENED_DATE,
        FormField::DiscoverDate => ids::DISCOVER_DATE,
        FormField::DueDate => ids::DUE_DATE,
        FormField::WhyItMatters => ids::WHY_IT_MATTERS,
        FormField::Teams => ids::TEAMS,
    };
    block_id
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModalView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub callback_id: &'static str,
    pub title: TextObject,
    pub submit: TextObject,
    pub close: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_metadata: Option<String>,
    pub blocks: Vec<Block>,
}

impl ModalView {
    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| matches!(block, Block::Input { block_id: id, .. } if id == block_id))
    }
}

/// Message the modal was launched from, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModalPrefill {
    pub message_text: Option<String>,
    pub metadata: Option<SourceMetadata>,
}

impl ModalPrefill {
    pub fn from_message(text: &str, metadata: SourceMetadata) -> Self {
        Self { message_text: Some(text.to_string()), metadata: Some(metadata) }
    }
}

/// Builds the modal. The teams selector is left out entirely while the
/// snapshot is empty since Slack rejects selects without options.
pub fn incident_modal(today: NaiveDate, teams: &TeamsSnapshot, prefill: &ModalPrefill) -> ModalView {
    let initial_title = prefill
        .message_text
        .as_deref()
        .map(|text| text.chars().take(TITLE_MAX_CHARS).collect::<String>())
        .filter(|text| !text.is_empty());
    let initial_description = prefill.message_text.clone().filter(|text| !text.is_empty());

    let mut blocks = vec![
        text_input(ids::TITLE, "Incident Title", "Brief description of the incident", TITLE_MAX_CHARS, false, initial_title, false),
        text_input(
            ids::DESCRIPTION,
            "Description",
            "Detailed description of what happened, impact, and any relevant context",
            DESCRIPTION_MAX_CHARS,
            true,
            initial_description,
            false,
        ),
        static_select(
            ids::SEVERITY,
            "Severity",
            "Select severity level",
            Severity::ALL.iter().map(|severity| OptionObject::new(severity_label(*severity), severity.as_str())).collect(),
        ),
        static_select(
            ids::AREA,
            "Area",
            "Select affected area",
            Area::ALL.iter().map(|area| OptionObject::new(area.as_str(), area.as_str())).collect(),
        ),
        date_input(ids::HAPPENED_DATE, "When did it happen?", None),
        date_input(ids::DISCOVER_DATE, "When was it discovered?", Some(today)),
        date_input(ids::DUE_DATE, "Due date", None),
        text_input(
            ids::WHY_IT_MATTERS,
            "Why it matters",
            "Impact on clients, team or business",
            WHY_IT_MATTERS_MAX_CHARS,
            true,
            None,
            true,
        ),
    ];

    if !teams.is_empty() {
        let (block_id, action_id) = ids::TEAMS;
        blocks.push(Block::Input {
            block_id: block_id.to_string(),
            label: TextObject::plain("Teams"),
            element: InputElement::MultiStaticSelect {
                action_id: action_id.to_string(),
                placeholder: Some(TextObject::plain("Select affected teams")),
                options: teams.teams.iter().map(|team| OptionObject::new(&team.name, &team.id)).collect(),
            },
            optional: true,
        });
    }

    ModalView {
        kind: "modal",
        callback_id: CALLBACK_ID,
        title: TextObject::plain("Report Incident"),
        submit: TextObject::plain("Submit"),
        close: TextObject::plain("Cancel"),
        private_metadata: prefill.metadata.as_ref().map(SourceMetadata::to_json),
        blocks,
    }
}

fn severity_label(severity: Severity) -> String {
    let hint = match severity {
        Severity::Asap => "Urgent, needs attention now",
        Severity::High => "Important",
        Severity::Normal => "Regular priority",
        Severity::Low => "Minor issue",
    };
    format!("{} {} - {hint}", severity.emoji(), severity)
}

fn text_input(
    (block_id, action_id): (&str, &str),
    label: &str,
    placeholder: &str,
    max_length: usize,
    multiline: bool,
    initial_value: Option<String>,
    optional: bool,
) -> Block {
    Block::Input {
        block_id: block_id.to_string(),
        label: TextObject::plain(label),
        element: InputElement::PlainTextInput {
            action_id: action_id.to_string(),
            placeholder: Some(TextObject::plain(placeholder)),
            multiline,
            max_length: Some(max_length),
            initial_value,
        },
        optional,
    }
}

fn static_select((block_id, action_id): (&str, &str), label: &str, placeholder: &str, options: Vec<OptionObject>) -> Block {
    Block::Input {
        block_id: block_id.to_string(),
        label: TextObject::plain(label),
        element: InputElement::StaticSelect {
            action_id: action_id.to_string(),
            placeholder: Some(TextObject::plain(placeholder)),
            options,
        },
        optional: false,
    }
}

fn date_input((block_id, action_id): (&str, &str), label: &str, initial: Option<NaiveDate>) -> Block {
    Block::Input {
        block_id: block_id.to_string(),
        label: TextObject::plain(label),
        element: InputElement::Datepicker {
            action_id: action_id.to_string(),
            placeholder: Some(TextObject::plain("Select a date")),
            initial_date: initial.map(|date| date.format("%Y-%m-%d").to_string()),
        },
        optional: true,
    }
}
