//! Writes the Slack location of the confirmation back onto the incident page.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::blocks::{Block, Color, PropertyMap, PropertyValue, RichText};
use crate::client::{DocumentStore, NotionError};
use crate::page::property;

const PLACEHOLDER_MARKER: &str = "Slack thread";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackLink {
    pub channel_id: String,
    pub message_ts: String,
    pub url: String,
}

impl SlackLink {
    pub fn new(channel_id: &str, message_ts: &str, workspace_domain: Option<&str>) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            message_ts: message_ts.to_string(),
            url: slack_message_url(channel_id, message_ts, workspace_domain),
        }
    }
}

/// Archive permalink when the workspace domain is known, otherwise a redirect
/// link that works from any workspace.
pub fn slack_message_url(channel_id: &str, message_ts: &str, workspace_domain: Option<&str>) -> String {
    match workspace_domain.map(str::trim).filter(|domain| !domain.is_empty()) {
        Some(domain) => {
            format!("https://{domain}.slack.com/archives/{channel_id}/p{}", message_ts.replace('.', ""))
        }
        None => format!("https://slack.com/app_redirect?channel={channel_id}&message_ts={message_ts}"),
    }
}

pub fn slack_link_properties(link: &SlackLink, now: DateTime<Utc>) -> PropertyMap {
    let mut properties = PropertyMap::new();
    properties.insert(property::SLACK_MESSAGE_URL.into(), PropertyValue::Url(link.url.clone()));
    properties.insert(property::SLACK_THREAD_ID.into(), PropertyValue::text(&link.message_ts));
    properties.insert(property::SLACK_CHANNEL_ID.into(), PropertyValue::text(&link.channel_id));
    properties.insert(
        property::LAST_SYNCED.into(),
        PropertyValue::date(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    properties
}

pub fn slack_link_bullet(url: &str) -> Block {
    Block::bullet(vec![
        RichText::plain("Slack thread: "),
        RichText::plain("View in Slack").link(url).color(Color::Blue),
    ])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackfillReport {
    pub placeholder_rewritten: bool,
}

/// Patches the link properties, then swaps the "Slack thread" placeholder
/// bullet for a real link. Only the property patch can fail the call; a
/// missing or unwritable placeholder is reported in the result.
pub async fn backfill_slack_link(
    store: &dyn DocumentStore,
    page_id: &str,
    link: &SlackLink,
    now: DateTime<Utc>,
) -> Result<BackfillReport, NotionError> {
    store.update_page_properties(page_id, &slack_link_properties(link, now)).await?;

    let placeholder_rewritten = match rewrite_placeholder(store, page_id, &link.url).await {
        Ok(rewritten) => rewritten,
        Err(error) => {
            warn!(event_name = "provenance.placeholder_update_failed", page_id, error = %error, "slack link bullet left as placeholder");
            false
        }
    };

    Ok(BackfillReport { placeholder_rewritten })
}

async fn rewrite_placeholder(
    store: &dyn DocumentStore,
    page_id: &str,
    url: &str,
) -> Result<bool, NotionError> {
    let children = store.list_block_children(page_id).await?;
    let Some(placeholder) = children
        .iter()
        .find(|block| block.kind == "bulleted_list_item" && block.plain_text.contains(PLACEHOLDER_MARKER))
    else {
        debug!(event_name = "provenance.placeholder_missing", page_id, "no slack thread bullet on page");
        return Ok(false);
    };

    store.update_block(&placeholder.id, &slack_link_bullet(url)).await?;
    Ok(true)
}
