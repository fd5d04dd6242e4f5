//! Relay configuration and protocol constants

use std::time::{SystemTime, UNIX_EPOCH};

/// Room lifetime from creation to eviction, in seconds
pub const ROOM_TTL_SECS: u64 = 3600;

/// Maximum messages retained per room; oldest are trimmed on overflow
pub const MAX_MESSAGES: usize = 500;

/// How often the sweeper scans for expired rooms, in seconds
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Member roster token length in hex characters
pub const MEMBER_ID_LEN: usize = 8;

/// Message id length in hex characters
pub const MESSAGE_ID_LEN: usize = 12;

/// Nickname cap in Unicode code points
pub const MAX_NICKNAME_CHARS: usize = 20;

/// Relay server configuration, resolved from CLI flags and environment
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Optional Redis URL for the persistent mirror
    pub redis_url: Option<String>,
}

/// Wall-clock seconds since the Unix epoch
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
