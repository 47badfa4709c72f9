//! HTTP surface: Slack's request URL, health and index.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{FromRequest, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use incident_slack::payloads::{parse_form, parse_json};
use incident_slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use incident_slack::{Ack, AckResponse, EventContext, EventDispatcher, SignatureVerifier, SlackEvent};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::health::{health, index, HealthState};

/// Slack retries after 3 s; answer empty a little before that.
pub const ACK_FALLBACK: Duration = Duration::from_millis(2500);
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct EventsState {
    pub dispatcher: Arc<EventDispatcher>,
    pub verifier: Arc<SignatureVerifier>,
    pub ack_fallback: Duration,
}

pub fn router(events: EventsState, health_state: HealthState) -> Router {
    let slack = Router::new()
        .route("/slack/events", post(slack_events))
        .route_layer(middleware::from_fn_with_state(events.clone(), verify_slack_signature))
        .with_state(events);
    let service = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .with_state(health_state);

    slack.merge(service).layer(TraceLayer::new_for_http())
}

/// Buffers the body, checks the signature, and hands the same bytes on.
async fn verify_slack_signature(State(state): State<EventsState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_BODY_BYTES).await else {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    };

    let header_value = |name: &str| parts.headers.get(name).and_then(|value| value.to_str().ok());
    if let Err(failure) = state.verifier.verify(
        header_value(TIMESTAMP_HEADER),
        header_value(SIGNATURE_HEADER),
        &bytes,
        Utc::now().timestamp(),
    ) {
        warn!(event_name = "slack.signature_rejected", error = %failure, "rejected unsigned slack request");
        return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn slack_events(State(state): State<EventsState>, request: Request) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let event = match decode_event(request).await {
        Ok(event) => event,
        Err(response) => return response,
    };

    info!(
        event_name = "slack.request_received",
        correlation_id = %correlation_id,
        event_type = ?event.event_type(),
        user_id = event.user_id().unwrap_or("unknown"),
        "slack request received"
    );

    let (ack, acked) = Ack::channel();
    let dispatcher = Arc::clone(&state.dispatcher);
    let ctx = EventContext { correlation_id: correlation_id.clone() };
    tokio::spawn(async move {
        if let Err(failure) = dispatcher.dispatch(event, ack, &ctx).await {
            error!(
                event_name = "slack.handler_failed",
                correlation_id = %ctx.correlation_id,
                error = %failure,
                "slack event handler failed"
            );
        }
    });

    match tokio::time::timeout(state.ack_fallback, acked).await {
        Ok(Ok(response)) => ack_response(response),
        Ok(Err(_)) | Err(_) => {
            warn!(
                event_name = "slack.ack_fallback",
                correlation_id = %correlation_id,
                "handler did not ack in time; answering empty"
            );
            StatusCode::OK.into_response()
        }
    }
}

async fn decode_event(request: Request) -> Result<SlackEvent, Response> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("application/json"));

    let parsed = if is_json {
        let body = Bytes::from_request(request, &()).await.map_err(IntoResponse::into_response)?;
        parse_json(&body)
    } else {
        let Form(form) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        parse_form(&form)
    };

    parsed.map_err(|failure| {
        warn!(event_name = "slack.payload_rejected", error = %failure, "could not decode slack payload");
        (StatusCode::BAD_REQUEST, failure.to_string()).into_response()
    })
}

fn ack_response(response: AckResponse) -> Response {
    match response.to_json() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::OK.into_response(),
    }
}
