//! XSalsa20-Poly1305 message framing
//!
//! Wire layout is `nonce(24) || ciphertext || tag(16)`, one opaque blob
//! per message, base64-encoded when it rides inside JSON. A fresh random
//! nonce is drawn per message; the relay stores the blob without ever
//! being able to distinguish plaintexts.

use crypto_secretbox::aead::{Aead, AeadCore, KeyInit, OsRng};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};

use crate::error::{CryptoError, Result};
use crate::kdf::RoomKey;

/// Nonce length in bytes
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length in bytes
pub const TAG_LEN: usize = 16;

/// Encrypt a plaintext under `key`, returning `nonce || ciphertext || tag`
pub fn seal(plaintext: &[u8], key: &RoomKey) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(key.as_bytes().into());
    let nonce = XSalsa20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encryption("secretbox seal failed".to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a `nonce || ciphertext || tag` blob.
///
/// Fails iff the tag does not verify under `key`; a wrong key, a
/// truncated blob, and a tampered blob all surface as the same
/// [`CryptoError::Decryption`].
pub fn open(blob: &[u8], key: &RoomKey) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::PayloadTooShort {
            needed: NONCE_LEN + TAG_LEN,
            actual: blob.len(),
        });
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = XSalsa20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_key;

    fn glyphs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn test_key(pin: &str, anchor: u64) -> RoomKey {
        derive_key(&glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]), pin, anchor).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = test_key("123456", 1_699_999_995);
        let blob = seal(b"hold the line", &key).unwrap();
        assert_eq!(open(&blob, &key).unwrap(), b"hold the line");
    }

    #[test]
    fn test_blob_layout() {
        let key = test_key("123456", 0);
        let blob = seal(b"x", &key).unwrap();
        assert_eq!(blob.len(), NONCE_LEN + 1 + TAG_LEN);
    }

    #[test]
    fn test_nonces_are_fresh_per_message() {
        let key = test_key("123456", 0);
        let a = seal(b"same plaintext", &key).unwrap();
        let b = seal(b"same plaintext", &key).unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = test_key("123456", 0);
        let wrong = test_key("123457", 0);
        let blob = seal(b"secret", &key).unwrap();
        assert_eq!(open(&blob, &wrong), Err(CryptoError::Decryption));
    }

    #[test]
    fn test_adjacent_anchor_key_fails() {
        let key = test_key("123456", 1_699_999_995);
        let next_bucket = test_key("123456", 1_700_000_010);
        let blob = seal(b"secret", &key).unwrap();
        assert!(open(&blob, &next_bucket).is_err());
    }

    #[test]
    fn test_tampered_blob_fails() {
        let key = test_key("123456", 0);
        let mut blob = seal(b"secret", &key).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert_eq!(open(&blob, &key), Err(CryptoError::Decryption));
    }

    #[test]
    fn test_short_blob_rejected() {
        let key = test_key("123456", 0);
        let result = open(&[0u8; NONCE_LEN + TAG_LEN - 1], &key);
        assert!(matches!(result, Err(CryptoError::PayloadTooShort { .. })));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key("123456", 0);
        let blob = seal(b"", &key).unwrap();
        assert_eq!(open(&blob, &key).unwrap(), b"");
    }
}
