//! Client session error types

use thiserror::Error;

/// Result type alias using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by the transport and controller
#[derive(Debug, Error)]
pub enum SessionError {
    /// A non-expired room already holds this fingerprint (HTTP 409).
    /// Pick a new room id.
    #[error("room already exists on the relay")]
    RoomExists,

    /// Room absent or expired (HTTP 404)
    #[error("room not found or expired")]
    RoomGone,

    /// Relay demanded a delay before the next attempt (HTTP 429)
    #[error("rate limited, retry in {retry_after}s")]
    RateLimited {
        /// Seconds the relay asked us to wait
        retry_after: u64,
    },

    /// Reserved PIN-challenge rejection (HTTP 401)
    #[error("relay rejected the room key")]
    InvalidKey,

    /// Any other non-success status from the relay
    #[error("relay returned unexpected status {0}")]
    UnexpectedStatus(u16),

    /// Connection-level failure; the transport transitions to
    /// `Reconnecting` and retries with backoff
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Operation requires an established room session
    #[error("no active room session")]
    NoRoom,

    /// Crypto-core failure (key derivation, sealing)
    #[error(transparent)]
    Crypto(#[from] sos_crypto::CryptoError),
}
