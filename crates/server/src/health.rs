use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use incident_notion::{CacheInfo, DocumentStore, TeamsCache};
use incident_slack::ChatPlatform;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    pub chat: Arc<dyn ChatPlatform>,
    pub store: Arc<dyn DocumentStore>,
    pub teams: Arc<TeamsCache>,
    pub incidents_database_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

impl HealthCheck {
    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub slack: HealthCheck,
    pub notion: HealthCheck,
    pub teams_cache: CacheInfo,
    pub checked_at: String,
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (slack, notion) = tokio::join!(slack_check(&state), notion_check(&state));
    let healthy = slack.is_ok() && notion.is_ok();
    if !healthy {
        warn!(
            event_name = "system.health.unhealthy",
            slack = %slack.detail,
            notion = %notion.detail,
            "health check failed"
        );
    }

    let payload = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        slack,
        notion,
        teams_cache: state.teams.cache_info(),
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn slack_check(state: &HealthState) -> HealthCheck {
    match state.chat.auth_test().await {
        Ok(identity) => HealthCheck {
            status: "ok",
            detail: format!("authenticated to workspace {}", identity.team.as_deref().unwrap_or("unknown")),
        },
        Err(error) => HealthCheck { status: "error", detail: format!("auth.test failed: {error}") },
    }
}

async fn notion_check(state: &HealthState) -> HealthCheck {
    match state.store.retrieve_database(&state.incidents_database_id).await {
        Ok(database) => HealthCheck { status: "ok", detail: format!("incidents database `{}` reachable", database.title) },
        Err(error) => HealthCheck { status: "error", detail: format!("databases.retrieve failed: {error}") },
    }
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "incident-bot",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "slack_events": "POST /slack/events",
            "health": "GET /health"
        }
    }))
}
