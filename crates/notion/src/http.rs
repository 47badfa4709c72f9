use std::time::Duration;

use async_trait::async_trait;
use incident_core::config::NotionConfig;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::blocks::{Block, PropertyMap};
use crate::client::{
    plain_text, BlockSummary, CreatePageRequest, DatabaseInfo, DatabaseQuery, DirectoryUser,
    DocumentStore, NotionError, PageObject, UserKind, UserPage,
};

const PAGE_SIZE: u32 = 100;

/// [`DocumentStore`] backed by the Notion REST API.
#[derive(Clone, Debug)]
pub struct NotionHttpClient {
    http: Client,
    base_url: String,
    token: SecretString,
    api_version: String,
}

impl NotionHttpClient {
    pub fn new(config: &NotionConfig, request_timeout: Duration) -> Result<Self, NotionError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| NotionError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.token.expose_secret())
            .header("Notion-Version", &self.api_version)
    }

    async fn send<T>(&self, endpoint: &str, request: RequestBuilder) -> Result<T, NotionError>
    where
        T: DeserializeOwned,
    {
        let response =
            request.send().await.map_err(|error| NotionError::Transport(error.to_string()))?;
        let status = response.status();
        debug!(event_name = "notion.response", endpoint, status = status.as_u16(), "notion call finished");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        response.json::<T>().await.map_err(|error| NotionError::Decode(error.to_string()))
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, NotionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(path, self.request(method, path).json(body)).await
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn api_error(status: u16, body: &str) -> NotionError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => NotionError::Api { status, code: parsed.code, message: parsed.message },
        Err(_) => NotionError::Api { status, code: "unknown".to_string(), message: body.to_string() },
    }
}

#[derive(Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Deserialize)]
struct Paginated<T> {
    results: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    person: Option<RawPerson>,
}

#[derive(Deserialize)]
struct RawPerson {
    #[serde(default)]
    email: Option<String>,
}

impl From<RawUser> for DirectoryUser {
    fn from(raw: RawUser) -> Self {
        let kind = match raw.kind.as_deref() {
            Some("person") => UserKind::Person,
            _ => UserKind::Bot,
        };
        Self { id: raw.id, name: raw.name, email: raw.person.and_then(|person| person.email), kind }
    }
}

#[derive(Deserialize)]
struct RawDatabase {
    id: String,
    #[serde(default)]
    title: Vec<Value>,
}

fn summarize_block(raw: &Value) -> Option<BlockSummary> {
    let id = raw.get("id")?.as_str()?.to_string();
    let kind = raw.get("type")?.as_str()?.to_string();
    let text = raw
        .get(&kind)
        .and_then(|body| body.get("rich_text"))
        .and_then(Value::as_array)
        .map(|parts| plain_text(parts))
        .unwrap_or_default();
    Some(BlockSummary { id, kind, plain_text: text })
}

/// `blocks/{id}` PATCH takes the type body without the `type` tag.
fn block_update_body(block: &Block) -> Result<Value, NotionError> {
    let mut value =
        serde_json::to_value(block).map_err(|error| NotionError::Decode(error.to_string()))?;
    if let Some(object) = value.as_object_mut() {
        object.remove("type");
    }
    Ok(value)
}

#[async_trait]
impl DocumentStore for NotionHttpClient {
    async fn create_page(&self, request: &CreatePageRequest) -> Result<String, NotionError> {
        let created: CreatedObject = self.send_json(Method::POST, "/pages", request).await?;
        Ok(created.id)
    }

    async fn update_page_properties(
        &self,
        page_id: &str,
        properties: &PropertyMap,
    ) -> Result<(), NotionError> {
        let path = format!("/pages/{page_id}");
        let _: Value =
            self.send_json(Method::PATCH, &path, &json!({ "properties": properties })).await?;
        Ok(())
    }

    async fn append_block_children(
        &self,
        block_id: &str,
        children: &[Block],
    ) -> Result<(), NotionError> {
        let path = format!("/blocks/{block_id}/children");
        let _: Value =
            self.send_json(Method::PATCH, &path, &json!({ "children": children })).await?;
        Ok(())
    }

    async fn list_block_children(&self, block_id: &str) -> Result<Vec<BlockSummary>, NotionError> {
        let path = format!("/blocks/{block_id}/children");
        let mut cursor: Option<String> = None;
        let mut blocks = Vec::new();

        loop {
            let mut request = self.request(Method::GET, &path).query(&[("page_size", PAGE_SIZE)]);
            if let Some(start) = &cursor {
                request = request.query(&[("start_cursor", start)]);
            }
            let page: Paginated<Value> = self.send(&path, request).await?;
            blocks.extend(page.results.iter().filter_map(summarize_block));

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(blocks)
    }

    async fn update_block(&self, block_id: &str, block: &Block) -> Result<(), NotionError> {
        let path = format!("/blocks/{block_id}");
        let body = block_update_body(block)?;
        let _: Value = self.send_json(Method::PATCH, &path, &body).await?;
        Ok(())
    }

    async fn query_database(
        &self,
        database_id: &str,
        query: &DatabaseQuery,
    ) -> Result<Vec<PageObject>, NotionError> {
        let path = format!("/databases/{database_id}/query");
        let mut cursor: Option<String> = None;
        let mut pages = Vec::new();

        loop {
            let mut body = serde_json::to_value(query)
                .map_err(|error| NotionError::Decode(error.to_string()))?;
            if let Some(object) = body.as_object_mut() {
                object.insert("page_size".to_string(), json!(PAGE_SIZE));
                if let Some(start) = &cursor {
                    object.insert("start_cursor".to_string(), json!(start));
                }
            }
            let page: Paginated<PageObject> = self.send_json(Method::POST, &path, &body).await?;
            pages.extend(page.results);

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(pages)
    }

    async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo, NotionError> {
        let path = format!("/databases/{database_id}");
        let raw: RawDatabase = self.send(&path, self.request(Method::GET, &path)).await?;
        Ok(DatabaseInfo { id: raw.id, title: plain_text(&raw.title) })
    }

    async fn list_users(&self, start_cursor: Option<&str>) -> Result<UserPage, NotionError> {
        let mut request = self.request(Method::GET, "/users").query(&[("page_size", PAGE_SIZE)]);
        if let Some(start) = start_cursor {
            request = request.query(&[("start_cursor", start)]);
        }
        let page: Paginated<RawUser> = self.send("/users", request).await?;

        Ok(UserPage {
            results: page.results.into_iter().map(DirectoryUser::from).collect(),
            has_more: page.has_more,
            next_cursor: page.next_cursor,
        })
    }
}
