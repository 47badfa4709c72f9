use chrono::NaiveDate;
use incident_core::{CreatedIncident, IncidentFormData, Severity, UnassignedIncident};
use serde::Serialize;

const DIGEST_DESCRIPTION_MAX_CHARS: usize = 200;
const PROCESS_NOTE: &str = "ℹ️ *Process Note:* As the reporter, you will be asked to verify the fix when the status changes to 'Ready for Review'.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

/// A selectable option in static and multi-static selects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionObject {
    pub text: TextObject,
    pub value: String,
}

impl OptionObject {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { text: TextObject::plain(label), value: value.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputElement {
    PlainTextInput {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        multiline: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_value: Option<String>,
    },
    StaticSelect {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
        options: Vec<OptionObject>,
    },
    MultiStaticSelect {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
        options: Vec<OptionObject>,
    },
    Datepicker {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_date: Option<String>,
    },
}

impl InputElement {
    pub fn action_id(&self) -> &str {
        match self {
            Self::PlainTextInput { action_id, .. }
            | Self::StaticSelect { action_id, .. }
            | Self::MultiStaticSelect { action_id, .. }
            | Self::Datepicker { action_id, .. } => action_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: TextObject,
    },
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<TextObject>,
    },
    Divider {},
    Context {
        elements: Vec<TextObject>,
    },
    Input {
        block_id: String,
        label: TextObject,
        element: InputElement,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        optional: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// A text-only message; Slack renders `fallback_text` as the body.
    pub fn text(text: impl Into<String>) -> Self {
        Self { fallback_text: text.into(), blocks: Vec::new() }
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { text: TextObject::plain(text) });
        self
    }

    pub fn section<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(builder.build());
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider {});
        self
    }

    pub fn context<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    block_id: Option<String>,
    text: Option<TextObject>,
    fields: Vec<TextObject>,
}

impl SectionBuilder {
    pub fn block_id(&mut self, block_id: impl Into<String>) -> &mut Self {
        self.block_id = Some(block_id.into());
        self
    }

    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    pub fn field(&mut self, text: impl Into<String>) -> &mut Self {
        self.fields.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Block {
        let text = if self.text.is_none() && self.fields.is_empty() {
            Some(TextObject::plain(""))
        } else {
            self.text
        };
        Block::Section { block_id: self.block_id, text, fields: self.fields }
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Posted to the origin thread or the submitter's DM once the page exists.
pub fn confirmation_message(form: &IncidentFormData, incident: &CreatedIncident) -> MessageTemplate {
    MessageBuilder::new(format!("New incident reported: {}", form.title))
        .header("🚨 New Incident Reported")
        .section(|section| {
            section
                .field(format!("*Title:*\n{}", form.title))
                .field(format!("*Reported by:*\n<@{}>", form.created_by))
                .field(format!("*Severity:*\n{} {}", form.severity.emoji(), form.severity))
                .field(format!("*Area:*\n{}", form.area));
        })
        .section(|section| {
            section.mrkdwn(format!("*Description:*\n{}", form.description));
        })
        .divider()
        .context(|context| {
            context.mrkdwn(format!(
                "📝 <{}|View in Notion> • ID: {}",
                incident.url,
                incident.short_id()
            ));
        })
        .context(|context| {
            context.mrkdwn(PROCESS_NOTE);
        })
        .build()
}

/// Ephemeral note for the submitter when the confirmation went to a shared thread.
pub fn submission_ack_text(incident: &CreatedIncident) -> String {
    format!(
        "✅ Incident created. The confirmation is posted in this thread. <{}|View in Notion>",
        incident.url
    )
}

pub fn open_form_failure_text(reason: &str) -> String {
    format!("❌ Failed to open incident form: {reason}")
}

/// Compact summary for the leadership digest channel.
pub fn digest_notification_message(
    form: &IncidentFormData,
    incident: &CreatedIncident,
    team_names: &[String],
    slack_thread_url: Option<&str>,
) -> MessageTemplate {
    let team_info =
        if team_names.is_empty() { "No team assigned".to_string() } else { team_names.join(", ") };

    let mut links = vec![format!("📝 <{}|View in Notion>", incident.url)];
    if let Some(url) = slack_thread_url {
        links.push(format!("💬 <{url}|Slack Thread>"));
    }

    MessageBuilder::new(format!("🚨 New Incident: {}", form.title))
        .section(|section| {
            section.mrkdwn(format!(
                "🚨 *New Incident: {}*\n{} *{}* | Team: {} | Reporter: <@{}>",
                form.title,
                form.severity.emoji(),
                form.severity,
                team_info,
                form.created_by
            ));
        })
        .section(|section| {
            section.mrkdwn(format!(
                "*Description:*\n{}",
                truncate_with_ellipsis(&form.description, DIGEST_DESCRIPTION_MAX_CHARS)
            ));
        })
        .context(|context| {
            context.mrkdwn(links.join(" • "));
        })
        .build()
}

/// One line item of the daily digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestItem {
    pub incident: UnassignedIncident,
    pub team_names: Vec<String>,
    pub days_open: i64,
}

/// Items are grouped `ASAP, High, Normal, Low`; anything with a missing or
/// unknown severity is listed last.
pub fn daily_digest_message(today: NaiveDate, items: &[DigestItem]) -> MessageTemplate {
    let date = today.format("%B %-d, %Y").to_string();
    let count = items.len();
    let (plural, verb) = if count == 1 { ("", "needs") } else { ("s", "need") };

    let mut builder = MessageBuilder::new(format!(
        "📋 Daily Incident Digest - {date} ({count} unassigned)"
    ))
    .header(format!("📋 Daily Incident Digest - {date}"))
    .section(|section| {
        section.mrkdwn(format!("⚠️ *{count} incident{plural} {verb} attention*"));
    })
    .divider();

    for rank in 0..=Severity::ALL.len() {
        for item in items.iter().filter(|item| severity_rank(item) == rank) {
            builder = builder.section(|section| {
                section.mrkdwn(digest_item_text(item));
            });
        }
    }

    builder
        .divider()
        .context(|context| {
            context.mrkdwn("💡 Assign owners in Notion to resolve these incidents");
        })
        .build()
}

fn severity_rank(item: &DigestItem) -> usize {
    item.incident
        .severity
        .as_deref()
        .and_then(|raw| raw.parse::<Severity>().ok())
        .and_then(|severity| Severity::ALL.iter().position(|known| *known == severity))
        .unwrap_or(Severity::ALL.len())
}

fn digest_item_text(item: &DigestItem) -> String {
    let incident = &item.incident;
    let severity = incident.severity.as_deref().unwrap_or("No severity");
    let team_info =
        if item.team_names.is_empty() { "No team".to_string() } else { item.team_names.join(", ") };

    format!(
        "{} *{}* | {}\n*{}*\nTeam: {} | Area: {}\n📝 <{}|View in Notion>",
        Severity::emoji_for(incident.severity.as_deref()),
        severity,
        days_text(item.days_open),
        incident.title,
        team_info,
        incident.area.as_deref().unwrap_or("Unknown"),
        incident.url
    )
}

pub fn days_text(days: i64) -> String {
    match days {
        i64::MIN..=0 => "today".to_string(),
        1 => "1 day ago".to_string(),
        days => format!("{days} days ago"),
    }
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
