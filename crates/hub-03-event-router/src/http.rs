//! HTTP surface: the event stream endpoint plus health and metrics.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use shared_types::TenantId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::domain::{RouterError, StreamRequest, SubscriberFilter};
use crate::egress::{run_egress, ChannelSink};
use crate::router::EventRouter;

/// Encoded frames buffered between the egress task and the socket.
const BODY_BUFFER: usize = 16;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

#[derive(Clone)]
pub struct HttpState {
    pub router: Arc<EventRouter>,
    pub keepalive: Duration,
    /// Bearer token required for tenant 0 streams. `None` leaves them open.
    pub superuser_token: Option<String>,
    pub shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub tenant_id: Option<u64>,
    pub integration_id: Option<u64>,
    pub event_types: Option<String>,
    pub order_ids: Option<String>,
    pub since_seq: Option<u64>,
}

pub fn http_router(state: HttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/events", get(stream_events))
        .route("/events/:tenant_id", get(stream_tenant_events))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}

async fn stream_events(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Response {
    open_stream(&state, &headers, None, query)
}

async fn stream_tenant_events(
    State(state): State<HttpState>,
    Path(tenant_id): Path<u64>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Response {
    open_stream(&state, &headers, Some(tenant_id), query)
}

fn open_stream(
    state: &HttpState,
    headers: &HeaderMap,
    path_tenant: Option<u64>,
    query: StreamQuery,
) -> Response {
    let tenant_id = TenantId(path_tenant.or(query.tenant_id).unwrap_or(0));
    if tenant_id.is_superuser() && !authorized(state, headers) {
        warn!("Rejected superuser stream without valid token");
        return error_response(StatusCode::UNAUTHORIZED, &RouterError::Unauthorized);
    }

    let filter = match SubscriberFilter::parse(
        query.integration_id,
        query.event_types.as_deref(),
        query.order_ids.as_deref(),
    ) {
        Ok(filter) => filter,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    let subscription = state.router.open_stream(StreamRequest {
        tenant_id,
        filter,
        since_seq: query.since_seq,
    });
    info!(
        connection_id = %subscription.connection_id(),
        tenant_id = %tenant_id,
        since_seq = ?query.since_seq,
        replay = subscription.replay.len(),
        "Stream opened"
    );

    let (sink, body) = ChannelSink::pair(BODY_BUFFER);
    tokio::spawn(run_egress(
        subscription,
        sink,
        state.keepalive,
        state.shutdown.clone(),
    ));

    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (X_ACCEL_BUFFERING, "no"),
            (CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

fn authorized(state: &HttpState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.superuser_token.as_deref() else {
        return true;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

fn error_response(status: StatusCode, error: &RouterError) -> Response {
    let body = json!({ "error": error.to_string(), "kind": error.kind().as_str() });
    (status, Json(body)).into_response()
}

async fn health(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "subscribers": state.router.subscriber_count(),
        "tenants_buffered": state.router.tenants_buffered(),
        "last_seq": state.router.last_seq(),
    }))
}

async fn metrics() -> Response {
    match hub_telemetry::encode_metrics() {
        Ok(body) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
