//! Wire types for the SOS chat relay HTTP surface
//!
//! Every request and response body exchanged between the session client
//! and the room registry, shared by both sides so the two cannot drift.
//! All bodies are JSON; timestamps are `f64` Unix seconds; message
//! content is opaque base64 ciphertext the relay never interprets.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub use sos_crypto::RoomMode;

/// `GET /health` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving
    pub status: String,
    /// Number of live rooms
    pub rooms: usize,
    /// Server clock, seconds since epoch
    pub timestamp: f64,
}

/// `POST /room` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    /// Room fingerprint: 16 lowercase hex characters
    pub room_hash: String,
    /// PIN behavior for the room's lifetime
    pub mode: RoomMode,
}

/// `POST /room` success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCreated {
    /// Echo of the created fingerprint
    pub room_hash: String,
    /// Mode the room was stored with
    pub mode: RoomMode,
    /// Creation instant
    pub created_at: f64,
    /// Eviction deadline (`created_at` + 3600)
    pub expires_at: f64,
    /// Caller's roster token
    pub member_id: String,
    /// Current roster nicknames
    pub members: Vec<String>,
}

/// `POST /room/{fp}/join` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Display name; sanitized and capped at 20 code points server-side
    #[serde(default = "default_nickname")]
    pub nickname: String,
}

fn default_nickname() -> String {
    "anon".to_string()
}

/// `POST /room/{fp}/join` success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    /// Fingerprint of the joined room
    pub room_hash: String,
    /// Mode the room was created with
    pub mode: RoomMode,
    /// Creation instant; fixed-mode joiners anchor key derivation on this
    pub created_at: f64,
    /// Eviction deadline
    pub expires_at: f64,
    /// Caller's roster token
    pub member_id: String,
    /// Current roster nicknames
    pub members: Vec<String>,
    /// Messages currently retained
    pub message_count: usize,
    /// Timestamp of the newest retained message, 0 when the log is empty
    pub last_message_ts: f64,
}

/// `POST /room/{fp}/send` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    /// Opaque base64 ciphertext
    pub content: String,
    /// Display hint used when `member_id` is absent or unknown
    #[serde(default = "default_nickname")]
    pub sender: String,
    /// Roster token; when known, the roster nickname overrides `sender`
    #[serde(default)]
    pub member_id: Option<String>,
}

/// `POST /room/{fp}/send` success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Server-assigned message id (12 hex characters)
    pub id: String,
    /// Server-assigned timestamp, monotone within the room
    pub timestamp: f64,
}

/// A stored message as returned by poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Server-assigned id
    pub id: String,
    /// Resolved sender nickname or client-supplied display hint
    pub sender: String,
    /// Opaque base64 ciphertext
    pub content: String,
    /// Server-assigned timestamp
    pub timestamp: f64,
}

/// `GET /room/{fp}/poll` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    /// Messages with `timestamp > since`, in append order
    pub messages: Vec<WireMessage>,
    /// Roster snapshot as of this poll
    pub members: Vec<String>,
    /// Eviction deadline
    pub expires_at: f64,
    /// Total messages currently retained
    pub message_count: usize,
}

/// `POST /room/{fp}/leave` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    /// Roster token to remove; unknown tokens are ignored
    #[serde(default)]
    pub member_id: Option<String>,
}

/// `POST /room/{fp}/leave` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveResponse {
    /// Always `"left"`
    pub status: String,
}

/// `GET /room/{fp}/info` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Room fingerprint
    pub room_hash: String,
    /// PIN behavior
    pub mode: RoomMode,
    /// Creation instant
    pub created_at: f64,
    /// Eviction deadline
    pub expires_at: f64,
    /// Roster nicknames
    pub members: Vec<String>,
    /// Messages currently retained
    pub message_count: usize,
    /// Whole seconds until eviction, clamped at zero
    pub time_remaining: u64,
}

/// Error body for every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short machine-readable tag (`rate_limited`, `room_not_found`, ...)
    pub error: String,
    /// Seconds to wait before retrying; present only on 429
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    /// Error body with just a tag
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retry_after: None,
        }
    }

    /// Rate-limit error carrying the mandated delay
    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            error: "rate_limited".to_string(),
            retry_after: Some(retry_after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RoomMode::Rotating).unwrap(), "\"rotating\"");
        assert_eq!(serde_json::to_string(&RoomMode::Fixed).unwrap(), "\"fixed\"");
    }

    #[test]
    fn test_create_request_rejects_unknown_mode() {
        let raw = r#"{"room_hash":"a1b2c3d4e5f6a7b8","mode":"bouncy"}"#;
        assert!(serde_json::from_str::<CreateRoomRequest>(raw).is_err());
    }

    #[test]
    fn test_join_request_defaults_nickname() {
        let req: JoinRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.nickname, "anon");
    }

    #[test]
    fn test_send_request_member_id_optional() {
        let raw = r#"{"content":"XYZ=="}"#;
        let req: SendRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.content, "XYZ==");
        assert_eq!(req.sender, "anon");
        assert!(req.member_id.is_none());
    }

    #[test]
    fn test_error_body_omits_absent_retry_after() {
        let body = serde_json::to_string(&ErrorBody::new("room_not_found")).unwrap();
        assert!(!body.contains("retry_after"));

        let body = serde_json::to_string(&ErrorBody::rate_limited(10)).unwrap();
        assert!(body.contains("\"retry_after\":10"));
    }

    #[test]
    fn test_wire_message_roundtrip() {
        let msg = WireMessage {
            id: "a1b2c3d4e5f6".to_string(),
            sender: "bob".to_string(),
            content: "XYZ==".to_string(),
            timestamp: 1_700_000_000.5,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: WireMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, msg.id);
        assert_eq!(back.timestamp, msg.timestamp);
    }
}
