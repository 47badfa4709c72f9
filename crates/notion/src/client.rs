use async_trait::async_trait;
use incident_core::errors::ApplicationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::blocks::{Block, PropertyMap};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotionError {
    #[error("notion request failed: {0}")]
    Transport(String),
    #[error("notion api error {status} ({code}): {message}")]
    Api { status: u16, code: String, message: String },
    #[error("could not decode notion response: {0}")]
    Decode(String),
}

impl From<NotionError> for ApplicationError {
    fn from(value: NotionError) -> Self {
        ApplicationError::DocumentStore(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CreatePageRequest {
    pub parent: DatabaseParent,
    pub properties: PropertyMap,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatabaseParent {
    pub database_id: String,
}

/// Body for `databases/{id}/query`. Pagination is handled by the client.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DatabaseQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<Value>,
}

/// A page as returned by queries. Property values stay raw JSON and are read
/// through the accessors below.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PageObject {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl PageObject {
    pub fn title(&self, name: &str) -> Option<String> {
        let parts = self.properties.get(name)?.get("title")?.as_array()?;
        let text = plain_text(parts);
        (!text.trim().is_empty()).then_some(text)
    }

    pub fn select_name(&self, name: &str) -> Option<String> {
        self.named_option(name, "select")
    }

    pub fn status_name(&self, name: &str) -> Option<String> {
        self.named_option(name, "status")
    }

    pub fn date_start(&self, name: &str) -> Option<String> {
        let start = self.properties.get(name)?.get("date")?.get("start")?.as_str()?;
        Some(start.to_string())
    }

    pub fn relation_ids(&self, name: &str) -> Vec<String> {
        self.properties
            .get(name)
            .and_then(|property| property.get("relation"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("id").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn named_option(&self, name: &str, kind: &str) -> Option<String> {
        let option = self.properties.get(name)?.get(kind)?.get("name")?.as_str()?;
        Some(option.to_string())
    }
}

/// Concatenated `plain_text` of a rich text array from an API response.
pub fn plain_text(parts: &[Value]) -> String {
    parts.iter().filter_map(|part| part.get("plain_text").and_then(Value::as_str)).collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSummary {
    pub id: String,
    pub kind: String,
    pub plain_text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub id: String,
    pub title: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserKind {
    Person,
    Bot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub kind: UserKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPage {
    pub results: Vec<DirectoryUser>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the id of the created page.
    async fn create_page(&self, request: &CreatePageRequest) -> Result<String, NotionError>;
    async fn update_page_properties(
        &self,
        page_id: &str,
        properties: &PropertyMap,
    ) -> Result<(), NotionError>;
    async fn append_block_children(
        &self,
        block_id: &str,
        children: &[Block],
    ) -> Result<(), NotionError>;
    async fn list_block_children(&self, block_id: &str) -> Result<Vec<BlockSummary>, NotionError>;
    async fn update_block(&self, block_id: &str, block: &Block) -> Result<(), NotionError>;
    /// Follows `next_cursor` until every matching page is returned.
    async fn query_database(
        &self,
        database_id: &str,
        query: &DatabaseQuery,
    ) -> Result<Vec<PageObject>, NotionError>;
    async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo, NotionError>;
    async fn list_users(&self, start_cursor: Option<&str>) -> Result<UserPage, NotionError>;
}
