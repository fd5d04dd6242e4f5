//! Error types for cryptographic operations

use thiserror::Error;

/// Result type alias using CryptoError
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Room id is not six glyphs from the protocol alphabet
    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    /// PIN is not six decimal digits
    #[error("Invalid PIN: {0}")]
    InvalidPin(String),

    /// Error during key derivation
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Error during encryption
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Authentication failed during decryption. Deliberately carries no
    /// detail: a wrong key and a tampered blob are indistinguishable.
    #[error("Decryption failed")]
    Decryption,

    /// Ciphertext blob too short to contain nonce and tag
    #[error("Payload too short: {actual} bytes, need at least {needed}")]
    PayloadTooShort {
        /// Minimum valid length
        needed: usize,
        /// Actual length received
        actual: usize,
    },
}
