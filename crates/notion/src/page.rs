//! Maps a submitted incident onto Notion properties and the page body.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use incident_core::{IncidentFormData, ThreadMessagesResult};

use crate::blocks::{Block, Color, PropertyMap, PropertyValue, RichText};
use crate::client::{CreatePageRequest, DatabaseParent};

pub const SLACK_THREAD_PLACEHOLDER: &str = "Slack thread (link will be added automatically)";

const RESOLUTION_STEPS: [&str; 8] = [
    "Assign an Owner - designate who is responsible for driving resolution",
    "Confirm Accountable - clarify who oversees progress and ensures closure",
    "Identify Root Cause - quickly assess what triggered or caused the issue",
    "Immediate Actions - what is being done right now to mitigate impact",
    "Longer-term Fix - what will be changed to prevent this from happening again",
    "Communicate Updates - inform relevant stakeholders (client, team, leadership)",
    "Update Status in Notion - move to In Progress / Resolved as appropriate",
    "Follow-up Check - review results or verify improvement after a few days",
];

pub mod property {
    pub const TITLE: &str = "Title";
    pub const DESCRIPTION: &str = "Description";
    pub const STATUS: &str = "Status";
    pub const SEVERITY: &str = "Severity";
    pub const AREA: &str = "Area";
    pub const DETECTED_DATE: &str = "Detected Date";
    pub const CREATED_FROM: &str = "Created From";
    pub const TRIGGER: &str = "Trigger";
    pub const REPORTER: &str = "Reporter";
    pub const HAPPENED_DATE: &str = "Happened Date";
    pub const DISCOVER_DATE: &str = "Discover Date";
    pub const DUE_DATE: &str = "Due Date";
    pub const TEAMS: &str = "Teams";
    pub const OWNER: &str = "Owner";
    pub const SLACK_MESSAGE_URL: &str = "Slack Message URL";
    pub const SLACK_THREAD_ID: &str = "Slack Thread ID";
    pub const SLACK_CHANNEL_ID: &str = "Slack Channel ID";
    pub const LAST_SYNCED: &str = "Last Synced";
}

#[derive(Clone, Debug, PartialEq)]
pub struct IncidentRecord {
    pub properties: PropertyMap,
    pub template: Vec<Block>,
    /// Appended after creation so a large thread never holds up the primary write.
    pub thread_context: Option<Vec<Block>>,
}

impl IncidentRecord {
    pub fn create_request(&self, database_id: &str) -> CreatePageRequest {
        CreatePageRequest {
            parent: DatabaseParent { database_id: database_id.to_string() },
            properties: self.properties.clone(),
            children: self.template.clone(),
        }
    }
}

pub fn build_incident_record(
    form: &IncidentFormData,
    thread: Option<&ThreadMessagesResult>,
    now: DateTime<Utc>,
) -> IncidentRecord {
    IncidentRecord {
        properties: incident_properties(form, now),
        template: page_template(&form.description, form.why_it_matters.as_deref()),
        thread_context: thread.and_then(thread_context_blocks),
    }
}

pub fn incident_properties(form: &IncidentFormData, now: DateTime<Utc>) -> PropertyMap {
    let mut properties = PropertyMap::new();
    properties.insert(property::TITLE.into(), PropertyValue::title(&form.title));
    properties.insert(property::DESCRIPTION.into(), PropertyValue::text(&form.description));
    properties.insert(property::STATUS.into(), PropertyValue::status("Open"));
    properties.insert(property::SEVERITY.into(), PropertyValue::select(form.severity.as_str()));
    properties.insert(property::AREA.into(), PropertyValue::select(form.area.as_str()));
    properties.insert(
        property::DETECTED_DATE.into(),
        PropertyValue::date(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    properties.insert(property::CREATED_FROM.into(), PropertyValue::select("Automatic"));
    properties.insert(property::TRIGGER.into(), PropertyValue::text(form.trigger.label()));

    if let Some(reporter) = &form.reporter_notion_id {
        properties.insert(property::REPORTER.into(), PropertyValue::people([reporter.as_str()]));
    }
    insert_date(&mut properties, property::HAPPENED_DATE, form.happened_date);
    insert_date(&mut properties, property::DISCOVER_DATE, form.discover_date);
    insert_date(&mut properties, property::DUE_DATE, form.due_date);
    if !form.team_ids.is_empty() {
        properties.insert(property::TEAMS.into(), PropertyValue::relation(form.team_ids.iter().cloned()));
    }

    properties
}

fn insert_date(properties: &mut PropertyMap, name: &str, date: Option<NaiveDate>) {
    if let Some(date) = date {
        properties.insert(name.into(), PropertyValue::date(date.format("%Y-%m-%d").to_string()));
    }
}

fn guidance(text: &str) -> Block {
    Block::quote(vec![RichText::plain(text).italic().color(Color::Gray)])
}

pub fn page_template(description: &str, why_it_matters: Option<&str>) -> Vec<Block> {
    let mut blocks = vec![
        Block::heading("🧠 What Happened"),
        guidance(
            "A short, factual summary of what occurred and how it was noticed.\nStick to facts — avoid opinions or assigning blame.",
        ),
        Block::paragraph(RichText::chunked(description)),
        Block::divider(),
        Block::heading("🎯 Why It Matters"),
        guidance(
            "Why is this important?\nWhat are the potential consequences for the team, client, or project?",
        ),
        Block::paragraph(why_it_matters.map(RichText::chunked).unwrap_or_default()),
        Block::divider(),
        Block::heading("🧰 Resolution Plan"),
        guidance("Steps that will be taken to move this incident toward resolution:"),
    ];
    blocks.extend(RESOLUTION_STEPS.iter().map(|step| Block::to_do(*step)));
    blocks.extend([
        Block::divider(),
        Block::heading("🧾 Postmortem"),
        guidance(
            "What was the real underlying cause?\nWhat worked well in the response, and what did not?\nWhat lessons did we learn?\nWhat systemic changes can we make to avoid similar issues?",
        ),
        Block::paragraph(Vec::new()),
        Block::divider(),
        Block::heading("🔗 Related"),
        Block::bullet(vec![RichText::plain(SLACK_THREAD_PLACEHOLDER).italic().color(Color::Gray)]),
        Block::bullet(vec![RichText::plain("Related incidents")]),
        Block::bullet(vec![RichText::plain("Docs / playbooks / client notes")]),
    ]);
    blocks
}

pub fn thread_context_title(count: usize) -> String {
    let noun = if count == 1 { "message" } else { "messages" };
    format!("💬 Thread Context ({count} {noun})")
}

/// Divider plus a toggle holding one quote per reply. `None` for an empty thread.
pub fn thread_context_blocks(thread: &ThreadMessagesResult) -> Option<Vec<Block>> {
    if thread.messages.is_empty() {
        return None;
    }

    let quotes = thread
        .messages
        .iter()
        .map(|message| {
            let text = format!("{} • {}\n{}", message.user_name, message.formatted_time, message.text);
            Block::quote(RichText::chunked(&text).into_iter().map(|part| part.color(Color::Gray)).collect())
        })
        .collect();

    Some(vec![
        Block::divider(),
        Block::toggle(vec![RichText::plain(thread_context_title(thread.messages.len())).bold()], quotes),
    ])
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use incident_core::{
        Area, IncidentFormData, Severity, ThreadMessage, ThreadMessagesResult, TriggerKind,
        ValidatedForm,
    };
    use serde_json::Value;

    use super::{build_incident_record, property, thread_context_title, SLACK_THREAD_PLACEHOLDER};
    use crate::blocks::{Block, PropertyValue};

    fn form() -> IncidentFormData {
        IncidentFormData::new(
            ValidatedForm {
                title: "Payment gateway down".to_string(),
                description: "Checkout returns 502".to_string(),
                severity: Severity::High,
                area: Area::Client,
                happened_date: None,
                discover_date: None,
                due_date: None,
                why_it_matters: None,
                team_ids: Vec::new(),
            },
            "U123",
            "Ada",
            "U123",
            TriggerKind::SlashCommand,
        )
    }

    fn message(user_name: &str, text: &str) -> ThreadMessage {
        ThreadMessage {
            user: "U9".to_string(),
            user_name: user_name.to_string(),
            text: text.to_string(),
            timestamp: "100.000200".to_string(),
            formatted_time: "9:05 AM".to_string(),
        }
    }

    #[test]
    fn required_only_submission_sets_exactly_the_required_properties() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid time");
        let record = build_incident_record(&form(), None, now);

        let names: Vec<&str> = record.properties.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                property::AREA,
                property::CREATED_FROM,
                property::DESCRIPTION,
                property::DETECTED_DATE,
                property::SEVERITY,
                property::STATUS,
                property::TITLE,
                property::TRIGGER,
            ]
        );
        assert_eq!(
            record.properties.get(property::DETECTED_DATE),
            Some(&PropertyValue::date("2024-05-01T12:00:00.000Z"))
        );
        assert_eq!(record.properties.get(property::STATUS), Some(&PropertyValue::status("Open")));
        assert!(record.thread_context.is_none());
    }

    #[test]
    fn optional_fields_are_written_when_present() {
        let mut form = form();
        form.reporter_notion_id = Some("notion-user-1".to_string());
        form.discover_date = NaiveDate::from_ymd_opt(2024, 4, 30);
        form.team_ids = vec!["team-1".to_string()];

        let record = build_incident_record(&form, None, Utc::now());

        assert_eq!(
            record.properties.get(property::REPORTER),
            Some(&PropertyValue::people(["notion-user-1"]))
        );
        assert_eq!(
            record.properties.get(property::DISCOVER_DATE),
            Some(&PropertyValue::date("2024-04-30"))
        );
        assert_eq!(record.properties.get(property::TEAMS), Some(&PropertyValue::relation(["team-1"])));
        assert!(!record.properties.contains_key(property::DUE_DATE));
    }

    #[test]
    fn description_property_is_capped_but_body_keeps_everything() {
        let mut form = form();
        form.description = "d".repeat(2500);

        let record = build_incident_record(&form, None, Utc::now());
        let props = serde_json::to_value(&record.properties).expect("serializes");
        let capped = props["Description"]["rich_text"][0]["text"]["content"].as_str().unwrap_or_default();
        assert_eq!(capped.len(), 2000);

        let body = serde_json::to_value(&record.template[2]).expect("serializes");
        let total: usize = body["paragraph"]["rich_text"]
            .as_array()
            .map(|parts| {
                parts.iter().filter_map(|part| part["text"]["content"].as_str()).map(str::len).sum()
            })
            .unwrap_or_default();
        assert_eq!(total, 2500);
    }

    #[test]
    fn template_has_five_sections_with_eight_unchecked_todos() {
        let record = build_incident_record(&form(), None, Utc::now());

        let headings: Vec<Value> = record
            .template
            .iter()
            .filter(|block| matches!(block, Block::Heading1 { .. }))
            .map(|block| serde_json::to_value(block).expect("serializes"))
            .collect();
        let titles: Vec<&str> = headings
            .iter()
            .filter_map(|value| value["heading_1"]["rich_text"][0]["text"]["content"].as_str())
            .collect();
        assert_eq!(
            titles,
            vec!["🧠 What Happened", "🎯 Why It Matters", "🧰 Resolution Plan", "🧾 Postmortem", "🔗 Related"]
        );

        let todos = record.template.iter().filter(|block| block.kind() == "to_do").count();
        assert_eq!(todos, 8);
        let dividers = record.template.iter().filter(|block| block.kind() == "divider").count();
        assert_eq!(dividers, 4);

        let placeholder = serde_json::to_value(&record.template[record.template.len() - 3]).expect("serializes");
        assert_eq!(
            placeholder["bulleted_list_item"]["rich_text"][0]["text"]["content"],
            SLACK_THREAD_PLACEHOLDER
        );
    }

    #[test]
    fn three_replies_render_a_thread_context_toggle() {
        let thread = ThreadMessagesResult {
            messages: vec![message("Ada", "first"), message("Grace", "second"), message("Alan", "third")],
            total_count: 3,
            has_more: false,
        };

        let record = build_incident_record(&form(), Some(&thread), Utc::now());
        let blocks = record.thread_context.expect("thread context present");

        assert_eq!(blocks[0], Block::divider());
        let toggle = serde_json::to_value(&blocks[1]).expect("serializes");
        assert_eq!(toggle["toggle"]["rich_text"][0]["text"]["content"], "💬 Thread Context (3 messages)");
        assert_eq!(toggle["toggle"]["rich_text"][0]["annotations"]["bold"], true);
        let children = toggle["toggle"]["children"].as_array().expect("children");
        assert_eq!(children.len(), 3);
        assert_eq!(children[0]["quote"]["rich_text"][0]["text"]["content"], "Ada • 9:05 AM\nfirst");
        assert_eq!(children[2]["quote"]["rich_text"][0]["text"]["content"], "Alan • 9:05 AM\nthird");
    }

    #[test]
    fn empty_thread_renders_nothing_and_singular_title() {
        let empty = ThreadMessagesResult::default();
        assert!(build_incident_record(&form(), Some(&empty), Utc::now()).thread_context.is_none());
        assert_eq!(thread_context_title(1), "💬 Thread Context (1 message)");
    }

    #[test]
    fn create_request_targets_the_database() {
        let record = build_incident_record(&form(), None, Utc::now());
        let request = record.create_request("db-incidents");

        assert_eq!(request.parent.database_id, "db-incidents");
        assert_eq!(request.children.len(), record.template.len());
    }
}
