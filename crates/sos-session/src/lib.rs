//! # SOS Chat Client Session
//!
//! The library a chat UI drives: a relay transport that tunnels through
//! a local SOCKS5 proxy when one is listening (falling back to direct
//! HTTP), queues sends across link loss, polls for new messages on a
//! fixed cadence, and a session controller that binds the crypto core to
//! the transport, encrypting outbound text and trying adjacent rotation
//! buckets on inbound ciphertext.
//!
//! The UI talks to two handles: [`TransportHandle`]/[`SessionHandle`]
//! for commands, and an event receiver for everything flowing back.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod transport;

pub use config::TransportConfig;
pub use controller::{SessionController, SessionHandle};
pub use error::{Result, SessionError};
pub use events::{ConnectionState, SessionEvent, TransportEvent};
pub use transport::{Transport, TransportHandle, TransportSender};
