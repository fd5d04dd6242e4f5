//! Server-side room state
//!
//! A room is a fingerprint, a roster, and a bounded ciphertext log. The
//! relay never interprets message content; it assigns ids and timestamps,
//! trims the log at the cap, and forgets the room at its deadline.

use serde::{Deserialize, Serialize};
use sos_proto::{RoomMode, WireMessage};

use crate::config::{
    MAX_MESSAGES, MAX_NICKNAME_CHARS, MEMBER_ID_LEN, MESSAGE_ID_LEN, ROOM_TTL_SECS,
};

/// A roster entry: server-issued token plus display nickname
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// 8-hex-character token, unique within the room
    pub id: String,
    /// Sanitized display name
    pub nickname: String,
}

/// Room storage record. Serialized as-is into the persistent mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Fingerprint the room is indexed under
    pub room_hash: String,
    /// PIN behavior the room was created with
    pub mode: RoomMode,
    /// Creation instant
    pub created_at: f64,
    /// Eviction deadline
    pub expires_at: f64,
    members: Vec<Member>,
    messages: Vec<WireMessage>,
}

impl Room {
    /// Allocate a fresh room and seat the creator. Returns the room and
    /// the creator's member token.
    pub fn create(room_hash: String, mode: RoomMode, now: f64) -> (Self, String) {
        let mut room = Self {
            room_hash,
            mode,
            created_at: now,
            expires_at: now + ROOM_TTL_SECS as f64,
            members: Vec::new(),
            messages: Vec::new(),
        };
        let member_id = room.add_member("creator");
        (room, member_id)
    }

    /// Whether the room has passed its deadline at instant `now`
    pub fn is_expired(&self, now: f64) -> bool {
        now > self.expires_at
    }

    /// Whole seconds until eviction, clamped at zero
    pub fn time_remaining(&self, now: f64) -> u64 {
        (self.expires_at - now).max(0.0) as u64
    }

    /// Seat a member under a fresh token; the nickname is sanitized and
    /// capped before storage
    pub fn add_member(&mut self, nickname: &str) -> String {
        let mut id = generate_token(MEMBER_ID_LEN);
        while self.members.iter().any(|m| m.id == id) {
            id = generate_token(MEMBER_ID_LEN);
        }
        self.members.push(Member {
            id: id.clone(),
            nickname: sanitize_nickname(nickname),
        });
        id
    }

    /// Remove a member token from the roster. Unknown tokens are a no-op.
    pub fn remove_member(&mut self, member_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.id != member_id);
        self.members.len() != before
    }

    /// Roster nickname for a member token
    pub fn member_nickname(&self, member_id: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.id == member_id)
            .map(|m| m.nickname.as_str())
    }

    /// Roster nicknames in join order
    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.nickname.clone()).collect()
    }

    /// Append a message with a server-assigned id and timestamp.
    ///
    /// Timestamps are clamped monotone non-decreasing within the room so
    /// append order and timestamp order agree. Overflowing the cap
    /// silently discards the oldest entry.
    pub fn append_message(&mut self, content: String, sender: String, now: f64) -> WireMessage {
        let timestamp = now.max(self.last_message_ts());
        let msg = WireMessage {
            id: generate_token(MESSAGE_ID_LEN),
            sender,
            content,
            timestamp,
        };
        self.messages.push(msg.clone());
        if self.messages.len() > MAX_MESSAGES {
            let excess = self.messages.len() - MAX_MESSAGES;
            self.messages.drain(..excess);
        }
        msg
    }

    /// Messages with `timestamp > since`, in append order
    pub fn messages_since(&self, since: f64) -> Vec<WireMessage> {
        self.messages
            .iter()
            .filter(|m| m.timestamp > since)
            .cloned()
            .collect()
    }

    /// Number of retained messages
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Timestamp of the newest retained message, 0 when the log is empty
    pub fn last_message_ts(&self) -> f64 {
        self.messages.last().map(|m| m.timestamp).unwrap_or(0.0)
    }
}

/// Random lowercase-hex token of `len` characters
fn generate_token(len: usize) -> String {
    let bytes: Vec<u8> = (0..len.div_ceil(2)).map(|_| rand::random()).collect();
    let mut token = hex::encode(bytes);
    token.truncate(len);
    token
}

/// Strip control characters and cap at [`MAX_NICKNAME_CHARS`] code
/// points; empty results fall back to `"anon"`
pub fn sanitize_nickname(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NICKNAME_CHARS)
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "anon".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_room() -> Room {
        Room::create("a1b2c3d4e5f6a7b8".to_string(), RoomMode::Rotating, 1000.0).0
    }

    #[test]
    fn test_create_seats_creator() {
        let (room, member_id) = Room::create("a1b2c3d4e5f6a7b8".into(), RoomMode::Fixed, 1000.0);
        assert_eq!(member_id.len(), MEMBER_ID_LEN);
        assert_eq!(room.member_names(), vec!["creator"]);
        assert_eq!(room.expires_at, 1000.0 + ROOM_TTL_SECS as f64);
    }

    #[test]
    fn test_expiry_boundary() {
        let room = fresh_room();
        assert!(!room.is_expired(1000.0 + 3599.0));
        assert!(!room.is_expired(1000.0 + 3600.0)); // deadline itself is reachable
        assert!(room.is_expired(1000.0 + 3601.0));
    }

    #[test]
    fn test_member_tokens_unique() {
        let mut room = fresh_room();
        let mut ids = std::collections::HashSet::new();
        for i in 0..50 {
            assert!(ids.insert(room.add_member(&format!("m{i}"))));
        }
    }

    #[test]
    fn test_remove_member() {
        let mut room = fresh_room();
        let id = room.add_member("bob");
        assert!(room.remove_member(&id));
        assert!(!room.remove_member(&id));
        assert_eq!(room.member_names(), vec!["creator"]);
    }

    #[test]
    fn test_member_nickname_lookup() {
        let mut room = fresh_room();
        let id = room.add_member("bob");
        assert_eq!(room.member_nickname(&id), Some("bob"));
        assert_eq!(room.member_nickname("deadbeef"), None);
    }

    #[test]
    fn test_timestamps_monotone() {
        let mut room = fresh_room();
        room.append_message("a".into(), "x".into(), 10.0);
        room.append_message("b".into(), "x".into(), 9.0); // clock stepped back
        room.append_message("c".into(), "x".into(), 11.0);

        let all = room.messages_since(0.0);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(all[1].timestamp, 10.0);
    }

    #[test]
    fn test_log_bounded_at_cap() {
        let mut room = fresh_room();
        for i in 0..(MAX_MESSAGES + 40) {
            room.append_message(format!("m{i}"), "x".into(), 1000.0 + i as f64);
        }
        assert_eq!(room.message_count(), MAX_MESSAGES);
        // Only the most recent survive
        let oldest = &room.messages_since(0.0)[0];
        assert_eq!(oldest.content, "m40");
    }

    #[test]
    fn test_messages_since_filters_strictly() {
        let mut room = fresh_room();
        room.append_message("a".into(), "x".into(), 10.0);
        room.append_message("b".into(), "x".into(), 20.0);

        assert_eq!(room.messages_since(0.0).len(), 2);
        assert_eq!(room.messages_since(10.0).len(), 1);
        assert_eq!(room.messages_since(20.0).len(), 0);
    }

    #[test]
    fn test_message_id_shape() {
        let mut room = fresh_room();
        let msg = room.append_message("a".into(), "x".into(), 10.0);
        assert_eq!(msg.id.len(), MESSAGE_ID_LEN);
        assert!(msg.id.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sanitize_nickname() {
        assert_eq!(sanitize_nickname("bob"), "bob");
        assert_eq!(sanitize_nickname("bob\x1b[31m"), "bob[31m");
        assert_eq!(sanitize_nickname(""), "anon");
        assert_eq!(sanitize_nickname("\t\n"), "anon");
        let long = "x".repeat(64);
        assert_eq!(sanitize_nickname(&long).chars().count(), MAX_NICKNAME_CHARS);
        // Cap counts code points, not bytes
        let emoji = "🦊".repeat(30);
        assert_eq!(sanitize_nickname(&emoji).chars().count(), MAX_NICKNAME_CHARS);
    }
}
