//! # SOS Chat Cryptographic Core
//!
//! Everything both endpoints must agree on to talk through an untrusted
//! relay: the 32-glyph emoji alphabet, room fingerprints, the 15-second
//! PIN rotation schedule, Argon2id key derivation, and the
//! XSalsa20-Poly1305 message framing.
//!
//! The relay never sees any of this: it stores opaque base64 blobs under
//! a 16-hex-character fingerprint. Key material lives only on the clients
//! and is wiped from memory on drop.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod alphabet;
pub mod credentials;
pub mod error;
pub mod kdf;
pub mod pin;
pub mod secretbox;

// Re-export commonly used types
pub use credentials::{RoomCredentials, RoomMode};
pub use error::{CryptoError, Result};
pub use kdf::RoomKey;

/// Library version constant
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
