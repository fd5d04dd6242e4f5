//! HTTP surface of the room registry
//!
//! All bodies are JSON. Recoverable failures produce `{error}` bodies
//! and never leak internals. CORS is wide open because the payloads are
//! opaque ciphertext; confidentiality comes from the clients, not from
//! origin checks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use sos_crypto::credentials::is_valid_fingerprint;
use sos_proto::{
    CreateRoomRequest, ErrorBody, HealthResponse, JoinRequest, JoinResponse, LeaveRequest,
    LeaveResponse, PollResponse, RoomCreated, RoomInfo, SendReceipt, SendRequest,
};

use crate::config::unix_now;
use crate::rate_limit::Decision;
use crate::registry::{Registry, RegistryError};

/// Build the relay router over a shared registry
pub fn router(registry: Arc<Registry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health))
        .route("/room", post(create_room))
        .route("/room/{room_hash}/join", post(join_room))
        .route("/room/{room_hash}/send", post(send_message))
        .route("/room/{room_hash}/poll", get(poll))
        .route("/room/{room_hash}/leave", post(leave))
        .route("/room/{room_hash}/info", get(room_info))
        .layer(cors)
        .with_state(registry)
}

/// Client IP as the rate limiter sees it, resolved at extraction time
struct ClientIp(String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        Ok(Self(client_ip(&parts.headers, peer)))
    }
}

/// Resolve the client IP: `X-Forwarded-For` (first token) takes
/// precedence, then `X-Real-IP`, then the peer address. `"unknown"` is a
/// single shared bucket for misconfigured deployments.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if let Some(xri) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return xri.trim().to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn error_response(status: StatusCode, tag: &str) -> Response {
    (status, Json(ErrorBody::new(tag))).into_response()
}

async fn health(State(registry): State<Arc<Registry>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        rooms: registry.room_count(),
        timestamp: unix_now(),
    })
}

async fn create_room(
    State(registry): State<Arc<Registry>>,
    ClientIp(ip): ClientIp,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Response {
    let now = unix_now();

    // The rate limiter counts the attempt before the body is examined,
    // so malformed floods still burn the caller's budget.
    if let Decision::Denied { retry_after } = registry.check_rate(&ip, now) {
        debug!(ip, retry_after, "room creation rate-limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorBody::rate_limited(retry_after)),
        )
            .into_response();
    }

    let Ok(Json(req)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_json");
    };

    if !is_valid_fingerprint(&req.room_hash) {
        return error_response(StatusCode::BAD_REQUEST, "invalid_room_hash");
    }

    match registry.create(&req.room_hash, req.mode, now).await {
        Ok((room, member_id)) => Json(RoomCreated {
            room_hash: room.room_hash.clone(),
            mode: room.mode,
            created_at: room.created_at,
            expires_at: room.expires_at,
            member_id,
            members: room.member_names(),
        })
        .into_response(),
        Err(RegistryError::RoomExists) => error_response(StatusCode::CONFLICT, "room_exists"),
    }
}

async fn join_room(
    State(registry): State<Arc<Registry>>,
    Path(room_hash): Path<String>,
    ClientIp(ip): ClientIp,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Response {
    let now = unix_now();
    // A missing or malformed body joins as "anon", matching lenient
    // clients that POST without one.
    let req = body.map(|Json(r)| r).unwrap_or(JoinRequest {
        nickname: "anon".to_string(),
    });

    let joined = registry
        .mutate(&room_hash, now, |room| {
            let member_id = room.add_member(&req.nickname);
            JoinResponse {
                room_hash: room.room_hash.clone(),
                mode: room.mode,
                created_at: room.created_at,
                expires_at: room.expires_at,
                member_id,
                members: room.member_names(),
                message_count: room.message_count(),
                last_message_ts: room.last_message_ts(),
            }
        })
        .await;

    match joined {
        Some(response) => {
            // Joining proves legitimate use of the fingerprint
            registry.reset_rate(&ip);
            Json(response).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "room_not_found"),
    }
}

async fn send_message(
    State(registry): State<Arc<Registry>>,
    Path(room_hash): Path<String>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    let now = unix_now();
    let Ok(Json(req)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_json");
    };
    if req.content.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing_content");
    }

    let receipt = registry
        .mutate(&room_hash, now, |room| {
            // A known member token pins the stored sender to the roster
            // nickname; otherwise the client-supplied hint is kept verbatim.
            let sender = req
                .member_id
                .as_deref()
                .and_then(|id| room.member_nickname(id))
                .map(str::to_string)
                .unwrap_or_else(|| req.sender.clone());
            let msg = room.append_message(req.content.clone(), sender, now);
            SendReceipt {
                id: msg.id,
                timestamp: msg.timestamp,
            }
        })
        .await;

    match receipt {
        Some(receipt) => Json(receipt).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "room_not_found"),
    }
}

#[derive(Debug, Deserialize)]
struct PollParams {
    #[serde(default)]
    since: f64,
    #[allow(dead_code)]
    member_id: Option<String>,
}

async fn poll(
    State(registry): State<Arc<Registry>>,
    Path(room_hash): Path<String>,
    params: Result<Query<PollParams>, axum::extract::rejection::QueryRejection>,
) -> Response {
    let now = unix_now();
    let Ok(Query(params)) = params else {
        return error_response(StatusCode::BAD_REQUEST, "invalid_query");
    };
    eprintln!("DEBUG poll params.since={:?} bits={:x}", params.since, params.since.to_bits());

    match registry.lookup(&room_hash, now).await {
        Some(room) => Json(PollResponse {
            messages: room.messages_since(params.since),
            members: room.member_names(),
            expires_at: room.expires_at,
            message_count: room.message_count(),
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "room_not_found"),
    }
}

async fn leave(
    State(registry): State<Arc<Registry>>,
    Path(room_hash): Path<String>,
    body: Result<Json<LeaveRequest>, JsonRejection>,
) -> Response {
    let now = unix_now();
    let req = body
        .map(|Json(r)| r)
        .unwrap_or(LeaveRequest { member_id: None });

    let left = registry
        .mutate(&room_hash, now, |room| {
            if let Some(member_id) = req.member_id.as_deref() {
                room.remove_member(member_id);
            }
        })
        .await;

    match left {
        // Leaving never deletes the room; only the sweeper does that
        Some(()) => Json(LeaveResponse {
            status: "left".to_string(),
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "room_not_found"),
    }
}

async fn room_info(
    State(registry): State<Arc<Registry>>,
    Path(room_hash): Path<String>,
) -> Response {
    let now = unix_now();
    match registry.lookup(&room_hash, now).await {
        Some(room) => Json(RoomInfo {
            room_hash: room.room_hash.clone(),
            mode: room.mode,
            created_at: room.created_at,
            expires_at: room.expires_at,
            members: room.member_names(),
            message_count: room.message_count(),
            time_remaining: room.time_remaining(now),
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "room_not_found"),
    }
}
