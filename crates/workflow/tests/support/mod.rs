#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use incident_notion::blocks::{Block, PropertyMap};
use incident_notion::{
    BlockSummary, CreatePageRequest, DatabaseInfo, DatabaseQuery, DirectoryUser, DocumentStore,
    NotionError, PageObject, UserKind, UserPage,
};
use incident_slack::blocks::MessageTemplate;
use incident_slack::client::{AuthIdentity, ConversationReplies, ReplyMessage};
use incident_slack::modal::ModalView;
use incident_slack::payloads::{ActionValue, SelectedOption};
use incident_slack::{ChatPlatform, PostedMessage, SlackApiError, UserProfile, ViewSubmissionPayload};

/// Shared, ordered log of every outbound call and the ack.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().expect("call log").clone()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedCall {
    pub channel: String,
    pub thread_ts: Option<String>,
    pub template: MessageTemplate,
}

pub struct RecordingChat {
    pub log: CallLog,
    pub profile: Result<UserProfile, SlackApiError>,
    pub user_info_delay: Option<Duration>,
    pub replies: Vec<ReplyMessage>,
    pub failing_channels: Vec<String>,
    pub posted: Mutex<Vec<PostedCall>>,
    pub ephemerals: Mutex<Vec<(String, String, String)>>,
}

impl RecordingChat {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            profile: Ok(UserProfile {
                id: "U123".to_string(),
                email: Some("ada@example.com".to_string()),
                display_name: Some("ada".to_string()),
                real_name: Some("Ada Lovelace".to_string()),
            }),
            user_info_delay: None,
            replies: Vec::new(),
            failing_channels: Vec::new(),
            posted: Mutex::new(Vec::new()),
            ephemerals: Mutex::new(Vec::new()),
        }
    }

    pub fn posted(&self) -> Vec<PostedCall> {
        self.posted.lock().expect("posted").clone()
    }

    fn note(&self, call: impl Into<String>) {
        self.log.lock().expect("call log").push(call.into());
    }
}

#[async_trait]
impl ChatPlatform for RecordingChat {
    async fn open_view(&self, _: &str, _: &ModalView) -> Result<(), SlackApiError> {
        self.note("slack.views.open");
        Ok(())
    }

    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        template: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError> {
        self.note(format!("slack.chat.postMessage:{channel}"));
        if self.failing_channels.iter().any(|failing| failing == channel) {
            return Err(SlackApiError::Api { method: "chat.postMessage".to_string(), error: "channel_not_found".to_string() });
        }
        let mut posted = self.posted.lock().expect("posted");
        posted.push(PostedCall {
            channel: channel.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            template: template.clone(),
        });
        Ok(PostedMessage { channel: channel.to_string(), ts: format!("1700000100.{:06}", posted.len()) })
    }

    async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<(), SlackApiError> {
        self.note(format!("slack.chat.postEphemeral:{channel}"));
        self.ephemerals.lock().expect("ephemerals").push((channel.to_string(), user.to_string(), text.to_string()));
        Ok(())
    }

    async fn user_info(&self, _: &str) -> Result<UserProfile, SlackApiError> {
        self.note("slack.users.info");
        if let Some(delay) = self.user_info_delay {
            tokio::time::sleep(delay).await;
        }
        self.profile.clone()
    }

    async fn conversation_replies(&self, channel: &str, _: &str, _: u32) -> Result<ConversationReplies, SlackApiError> {
        self.note(format!("slack.conversations.replies:{channel}"));
        Ok(ConversationReplies { messages: self.replies.clone(), has_more: false })
    }

    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
        self.note("slack.auth.test");
        Ok(AuthIdentity { team: Some("Acme".to_string()), user: Some("incident-bot".to_string()), bot_id: Some("B1".to_string()) })
    }
}

pub struct RecordingStore {
    pub log: CallLog,
    pub fail_create: bool,
    pub fail_append: bool,
    pub users: Vec<DirectoryUser>,
    pub unassigned: Vec<PageObject>,
    pub created: Mutex<Vec<CreatePageRequest>>,
    pub appended: Mutex<Vec<(String, Vec<Block>)>>,
    pub patched: Mutex<Vec<(String, PropertyMap)>>,
    pub updated_blocks: Mutex<Vec<(String, Block)>>,
}

impl RecordingStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_create: false,
            fail_append: false,
            users: vec![DirectoryUser {
                id: "notion-ada".to_string(),
                name: Some("Ada Lovelace".to_string()),
                email: Some("ada@example.com".to_string()),
                kind: UserKind::Person,
            }],
            unassigned: Vec::new(),
            created: Mutex::new(Vec::new()),
            appended: Mutex::new(Vec::new()),
            patched: Mutex::new(Vec::new()),
            updated_blocks: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<CreatePageRequest> {
        self.created.lock().expect("created").clone()
    }

    fn note(&self, call: impl Into<String>) {
        self.log.lock().expect("call log").push(call.into());
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn create_page(&self, request: &CreatePageRequest) -> Result<String, NotionError> {
        self.note("notion.pages.create");
        if self.fail_create {
            return Err(NotionError::Api {
                status: 400,
                code: "validation_error".to_string(),
                message: "Severity is not a property that exists.".to_string(),
            });
        }
        self.created.lock().expect("created").push(request.clone());
        Ok("1f2e3d4c-5b6a-7980-aabb-ccddeeff0011".to_string())
    }

    async fn update_page_properties(&self, page_id: &str, properties: &PropertyMap) -> Result<(), NotionError> {
        self.note("notion.pages.update");
        self.patched.lock().expect("patched").push((page_id.to_string(), properties.clone()));
        Ok(())
    }

    async fn append_block_children(&self, block_id: &str, children: &[Block]) -> Result<(), NotionError> {
        self.note("notion.blocks.children.append");
        if self.fail_append {
            return Err(NotionError::Api {
                status: 400,
                code: "validation_error".to_string(),
                message: "body.children.length should be ≤ 100".to_string(),
            });
        }
        self.appended.lock().expect("appended").push((block_id.to_string(), children.to_vec()));
        Ok(())
    }

    async fn list_block_children(&self, _: &str) -> Result<Vec<BlockSummary>, NotionError> {
        self.note("notion.blocks.children.list");
        Ok(vec![BlockSummary {
            id: "bullet-1".to_string(),
            kind: "bulleted_list_item".to_string(),
            plain_text: "Slack thread (link will be added automatically)".to_string(),
        }])
    }

    async fn update_block(&self, block_id: &str, block: &Block) -> Result<(), NotionError> {
        self.note("notion.blocks.update");
        self.updated_blocks.lock().expect("updated").push((block_id.to_string(), block.clone()));
        Ok(())
    }

    async fn query_database(&self, _: &str, _: &DatabaseQuery) -> Result<Vec<PageObject>, NotionError> {
        self.note("notion.databases.query");
        Ok(self.unassigned.clone())
    }

    async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo, NotionError> {
        self.note("notion.databases.retrieve");
        Ok(DatabaseInfo { id: database_id.to_string(), title: "Incidents".to_string() })
    }

    async fn list_users(&self, _: Option<&str>) -> Result<UserPage, NotionError> {
        self.note("notion.users.list");
        Ok(UserPage { results: self.users.clone(), has_more: false, next_cursor: None })
    }
}

fn text_value(value: &str) -> ActionValue {
    ActionValue { value: Some(value.to_string()), ..ActionValue::default() }
}

fn select_value(value: &str) -> ActionValue {
    ActionValue { selected_option: Some(SelectedOption { value: value.to_string() }), ..ActionValue::default() }
}

/// A submission with only the required inputs answered.
pub fn required_only_submission() -> ViewSubmissionPayload {
    let mut values = HashMap::new();
    for ((block, action), value) in [
        (("title_block", "title_input"), text_value("Checkout returns 500")),
        (("description_block", "description_input"), text_value("Payments fail for EU cards.")),
        (("severity_block", "severity_input"), select_value("High")),
        (("area_block", "area_input"), select_value("Client")),
    ] {
        values.insert(block.to_string(), HashMap::from([(action.to_string(), value)]));
    }
    ViewSubmissionPayload {
        callback_id: "incident_modal".to_string(),
        user_id: "U123".to_string(),
        user_name: "ada.l".to_string(),
        private_metadata: String::new(),
        values,
    }
}

pub fn message_action_submission(channel_id: &str) -> ViewSubmissionPayload {
    ViewSubmissionPayload {
        private_metadata: format!(
            r#"{{"sourceChannelId":"{channel_id}","sourceMessageTs":"1700000000.000100","sourceThreadTs":"1700000000.000100"}}"#
        ),
        ..required_only_submission()
    }
}

pub fn reply(user: &str, text: &str, ts: &str) -> ReplyMessage {
    ReplyMessage { user: Some(user.to_string()), text: Some(text.to_string()), ts: Some(ts.to_string()) }
}
