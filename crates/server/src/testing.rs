//! In-memory clients for route and wiring tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use incident_core::config::AppConfig;
use incident_notion::blocks::{Block, PropertyMap};
use incident_notion::{
    BlockSummary, CreatePageRequest, DatabaseInfo, DatabaseQuery, DocumentStore, NotionError,
    NotionTeamSource, PageObject, TeamsCache, UserPage,
};
use incident_slack::blocks::MessageTemplate;
use incident_slack::client::{AuthIdentity, ConversationReplies};
use incident_slack::modal::ModalView;
use incident_slack::{ChatPlatform, PostedMessage, SlackApiError, UserProfile};
use secrecy::SecretString;

pub const SIGNING_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

pub fn fake_app_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.slack.bot_token = SecretString::from("xoxb-test".to_string());
    config.slack.signing_secret = SecretString::from(SIGNING_SECRET.to_string());
    config.notion.token = SecretString::from("secret_test".to_string());
    config.notion.incidents_database_id = "incidents-db".to_string();
    config
}

pub fn teams_cache() -> Arc<TeamsCache> {
    TeamsCache::new(
        Arc::new(NotionTeamSource::new(FakeStore::shared(), None)),
        Duration::from_secs(300),
    )
}

fn unused_slack() -> SlackApiError {
    SlackApiError::Transport("not used in this test".to_string())
}

fn unused_notion() -> NotionError {
    NotionError::Transport("not used in this test".to_string())
}

#[derive(Default)]
pub struct FakeChat {
    pub auth_fails: bool,
    pub views_opened: AtomicUsize,
}

impl FakeChat {
    pub fn shared() -> Arc<dyn ChatPlatform> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn open_view(&self, _: &str, _: &ModalView) -> Result<(), SlackApiError> {
        self.views_opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn post_message(&self, channel: &str, _: Option<&str>, _: &MessageTemplate) -> Result<PostedMessage, SlackApiError> {
        Ok(PostedMessage { channel: channel.to_string(), ts: "1700000000.000100".to_string() })
    }

    async fn post_ephemeral(&self, _: &str, _: &str, _: &str) -> Result<(), SlackApiError> {
        Ok(())
    }

    async fn user_info(&self, _: &str) -> Result<UserProfile, SlackApiError> {
        Err(unused_slack())
    }

    async fn conversation_replies(&self, _: &str, _: &str, _: u32) -> Result<ConversationReplies, SlackApiError> {
        Err(unused_slack())
    }

    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
        if self.auth_fails {
            return Err(SlackApiError::Api { method: "auth.test".to_string(), error: "invalid_auth".to_string() });
        }
        Ok(AuthIdentity { team: Some("Acme".to_string()), user: Some("incident-bot".to_string()), bot_id: Some("B1".to_string()) })
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub retrieve_fails: bool,
}

impl FakeStore {
    pub fn shared() -> Arc<dyn DocumentStore> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn create_page(&self, _: &CreatePageRequest) -> Result<String, NotionError> {
        Err(unused_notion())
    }

    async fn update_page_properties(&self, _: &str, _: &PropertyMap) -> Result<(), NotionError> {
        Err(unused_notion())
    }

    async fn append_block_children(&self, _: &str, _: &[Block]) -> Result<(), NotionError> {
        Err(unused_notion())
    }

    async fn list_block_children(&self, _: &str) -> Result<Vec<BlockSummary>, NotionError> {
        Err(unused_notion())
    }

    async fn update_block(&self, _: &str, _: &Block) -> Result<(), NotionError> {
        Err(unused_notion())
    }

    async fn query_database(&self, _: &str, _: &DatabaseQuery) -> Result<Vec<PageObject>, NotionError> {
        Ok(Vec::new())
    }

    async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo, NotionError> {
        if self.retrieve_fails {
            return Err(NotionError::Api {
                status: 401,
                code: "unauthorized".to_string(),
                message: "API token is invalid.".to_string(),
            });
        }
        Ok(DatabaseInfo { id: database_id.to_string(), title: "Incidents".to_string() })
    }

    async fn list_users(&self, _: Option<&str>) -> Result<UserPage, NotionError> {
        Ok(UserPage::default())
    }
}
