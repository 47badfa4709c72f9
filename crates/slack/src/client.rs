use async_trait::async_trait;
use incident_core::errors::ApplicationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blocks::MessageTemplate;
use crate::modal::ModalView;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack request failed: {0}")]
    Transport(String),
    /// Slack answered `ok: false`.
    #[error("slack method `{method}` failed: {error}")]
    Api { method: String, error: String },
    #[error("slack http status {status} from `{method}`")]
    Status { method: String, status: u16 },
    #[error("could not decode slack response: {0}")]
    Decode(String),
}

impl From<SlackApiError> for ApplicationError {
    fn from(value: SlackApiError) -> Self {
        ApplicationError::ChatPlatform(value.to_string())
    }
}

/// Where a posted message landed; used to build permalinks.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub real_name: Option<String>,
}

impl UserProfile {
    /// `display_name`, then `real_name`; blank values are skipped.
    pub fn preferred_name(&self) -> Option<&str> {
        [self.display_name.as_deref(), self.real_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
    }
}

/// One entry of `conversations.replies`; the first is the thread root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationReplies {
    pub messages: Vec<ReplyMessage>,
    pub has_more: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

/// The Slack Web API methods the bot relies on.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError>;

    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError>;

    async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<(), SlackApiError>;

    async fn user_info(&self, user_id: &str) -> Result<UserProfile, SlackApiError>;

    async fn conversation_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: u32,
    ) -> Result<ConversationReplies, SlackApiError>;

    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError>;
}
