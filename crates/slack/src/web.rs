use std::time::Duration;

use async_trait::async_trait;
use incident_core::config::SlackConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::blocks::MessageTemplate;
use crate::client::{
    AuthIdentity, ChatPlatform, ConversationReplies, PostedMessage, ReplyMessage, SlackApiError,
    UserProfile,
};
use crate::modal::ModalView;

/// [`ChatPlatform`] backed by the Slack Web API.
#[derive(Clone, Debug)]
pub struct SlackWebClient {
    http: Client,
    base_url: String,
    token: SecretString,
}

impl SlackWebClient {
    pub fn new(config: &SlackConfig, request_timeout: Duration) -> Result<Self, SlackApiError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.bot_token.clone(),
        })
    }

    /// POSTs a JSON body and unwraps Slack's `{ok, error, ...}` envelope.
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, SlackApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        self.unwrap_envelope(method, response).await
    }

    /// `users.info` and `conversations.replies` are read methods taking a query string.
    async fn call_get<T>(&self, method: &str, query: &[(&str, String)]) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, method))
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        self.unwrap_envelope(method, response).await
    }

    async fn unwrap_envelope<T>(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        debug!(event_name = "slack.response", method, status = status.as_u16(), "slack call finished");
        if !status.is_success() {
            return Err(SlackApiError::Status { method: method.to_string(), status: status.as_u16() });
        }

        let body: Value =
            response.json().await.map_err(|error| SlackApiError::Decode(error.to_string()))?;
        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
            return Err(SlackApiError::Api { method: method.to_string(), error: error.to_string() });
        }
        serde_json::from_value(body).map_err(|error| SlackApiError::Decode(error.to_string()))
    }
}

#[derive(Deserialize)]
struct Empty {}

#[derive(Deserialize)]
struct UserInfoResponse {
    user: RawUser,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: RawProfile,
}

#[derive(Default, Deserialize)]
struct RawProfile {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

impl From<RawUser> for UserProfile {
    fn from(raw: RawUser) -> Self {
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        Self {
            id: raw.id,
            email: non_empty(raw.profile.email),
            display_name: non_empty(raw.profile.display_name),
            real_name: non_empty(raw.real_name).or_else(|| non_empty(raw.profile.real_name)),
        }
    }
}

#[derive(Deserialize)]
struct RepliesResponse {
    #[serde(default)]
    messages: Vec<ReplyMessage>,
    #[serde(default)]
    has_more: bool,
}

fn message_body(channel: &str, thread_ts: Option<&str>, message: &MessageTemplate) -> Value {
    let mut body = json!({
        "channel": channel,
        "text": message.fallback_text,
    });
    if !message.blocks.is_empty() {
        body["blocks"] = json!(message.blocks);
    }
    if let Some(thread_ts) = thread_ts {
        body["thread_ts"] = json!(thread_ts);
    }
    body
}

#[async_trait]
impl ChatPlatform for SlackWebClient {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
        let _: Empty = self.call("views.open", &json!({"trigger_id": trigger_id, "view": view})).await?;
        Ok(())
    }

    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError> {
        self.call("chat.postMessage", &message_body(channel, thread_ts, message)).await
    }

    async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<(), SlackApiError> {
        let _: Empty = self
            .call("chat.postEphemeral", &json!({"channel": channel, "user": user, "text": text}))
            .await?;
        Ok(())
    }

    async fn user_info(&self, user_id: &str) -> Result<UserProfile, SlackApiError> {
        let response: UserInfoResponse =
            self.call_get("users.info", &[("user", user_id.to_string())]).await?;
        Ok(response.user.into())
    }

    async fn conversation_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: u32,
    ) -> Result<ConversationReplies, SlackApiError> {
        let response: RepliesResponse = self
            .call_get(
                "conversations.replies",
                &[
                    ("channel", channel.to_string()),
                    ("ts", thread_ts.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(ConversationReplies { messages: response.messages, has_more: response.has_more })
    }

    async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
        self.call("auth.test", &json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::{Query, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use incident_core::config::{AppConfig, SlackConfig};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    use super::{message_body, SlackWebClient};
    use crate::blocks::MessageTemplate;
    use crate::client::{ChatPlatform, SlackApiError};

    type Shared = Arc<Mutex<Vec<(String, Value)>>>;

    async fn post_message(
        State(recorded): State<Shared>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let auth = headers.get("authorization").and_then(|value| value.to_str().ok()).unwrap_or("");
        recorded.lock().await.push((auth.to_string(), body.clone()));
        Json(json!({"ok": true, "channel": body["channel"], "ts": "1700000000.000100"}))
    }

    async fn user_info(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
        Json(json!({
            "ok": true,
            "user": {
                "id": query.get("user").cloned().unwrap_or_default(),
                "real_name": "Ada Lovelace",
                "profile": {"email": "ada@example.com", "display_name": ""}
            }
        }))
    }

    async fn not_authed() -> Json<Value> {
        Json(json!({"ok": false, "error": "not_authed"}))
    }

    async fn spawn_stub() -> (SlackWebClient, Shared) {
        let recorded: Shared = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/chat.postMessage", post(post_message))
            .route("/users.info", get(user_info))
            .route("/auth.test", post(not_authed))
            .with_state(recorded.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let address = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let config = SlackConfig {
            bot_token: SecretString::from("xoxb-test"),
            api_base_url: format!("http://{address}"),
            ..AppConfig::default().slack
        };
        let client = SlackWebClient::new(&config, Duration::from_secs(5)).expect("client");
        (client, recorded)
    }

    #[tokio::test]
    async fn post_message_sends_bearer_token_and_thread() {
        let (client, recorded) = spawn_stub().await;

        let posted = client
            .post_message("C1", Some("1.1"), &MessageTemplate::text("hello"))
            .await
            .expect("posted");

        assert_eq!(posted.channel, "C1");
        assert_eq!(posted.ts, "1700000000.000100");
        let calls = recorded.lock().await;
        assert_eq!(calls[0].0, "Bearer xoxb-test");
        assert_eq!(calls[0].1["thread_ts"], "1.1");
        assert_eq!(calls[0].1["text"], "hello");
        assert!(calls[0].1.get("blocks").is_none());
    }

    #[tokio::test]
    async fn user_info_maps_profile_and_drops_blank_names() {
        let (client, _) = spawn_stub().await;

        let profile = client.user_info("U42").await.expect("user");

        assert_eq!(profile.id, "U42");
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
        assert_eq!(profile.display_name, None);
        assert_eq!(profile.preferred_name(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn ok_false_becomes_api_error() {
        let (client, _) = spawn_stub().await;

        let error = client.auth_test().await.expect_err("not authed");

        assert_eq!(
            error,
            SlackApiError::Api { method: "auth.test".to_string(), error: "not_authed".to_string() }
        );
    }

    #[test]
    fn message_body_omits_thread_for_top_level_posts() {
        let body = message_body("U1", None, &MessageTemplate::text("dm"));
        assert_eq!(body, json!({"channel": "U1", "text": "dm"}));
    }
}
