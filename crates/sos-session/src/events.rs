//! Connection states and the event streams flowing back to the UI

use sos_proto::WireMessage;

/// Transport connection state machine.
///
/// `Disconnected` → `Connecting` → `Connected` ↔ `Reconnecting`, with
/// `Error` terminal from the initial bring-up only. Link loss after
/// bring-up always lands in `Reconnecting`, never `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No client, no session
    Disconnected,
    /// Initial bring-up in progress
    Connecting,
    /// Relay reachable; poll loop live
    Connected,
    /// Link lost; retrying with exponential backoff
    Reconnecting,
    /// Initial bring-up failed; terminal
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Raw transport events, consumed by the session controller
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A message arrived from a poll; content is still ciphertext
    Message(WireMessage),
    /// Connection state moved
    StateChange(ConnectionState),
    /// Roster snapshot from the latest poll
    MembersUpdate(Vec<String>),
    /// The room is gone for good (404 on poll or deadline passed)
    RoomExpire,
}

/// Decrypted session events, consumed by the UI
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A decrypted chat message
    Message {
        /// Sender as resolved by the relay (display hint, not identity)
        sender: String,
        /// Decrypted text
        text: String,
        /// Server-assigned timestamp
        timestamp: f64,
    },
    /// Connection state moved
    StateChange(ConnectionState),
    /// Roster snapshot
    MembersUpdate(Vec<String>),
    /// The room is gone for good
    RoomExpire,
    /// A message failed to decrypt under every candidate key and was
    /// dropped from the visible log
    KeyMismatch,
}
