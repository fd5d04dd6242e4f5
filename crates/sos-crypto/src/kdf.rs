//! Argon2id room-key derivation
//!
//! Password = `emojis:pin`, salt = SHA-256("sos-chat-v1:" + emojis +
//! ":" + anchor) truncated to 16 bytes. The anchor pins the key to a
//! rotation bucket (rotating mode) or to the room's creation instant
//! (fixed mode), so two endpoints derive the same key iff they agree on
//! all three inputs.
//!
//! Parameters (t=2, m=64 MiB, p=1) are a deliberate trade: derivation
//! finishes well inside a 15-second bucket on client hardware, while an
//! offline PIN search over captured ciphertext stays expensive.

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::credentials::RoomCredentials;
use crate::error::{CryptoError, Result};
use crate::pin::{bucket_anchor, bucket_at};
use crate::RoomMode;

/// Derived key length in bytes
pub const KEY_LEN: usize = 32;

/// Domain-separation prefix baked into every salt
const SALT_DOMAIN: &str = "sos-chat-v1:";

/// Argon2id time cost
const ARGON2_TIME_COST: u32 = 2;

/// Argon2id memory cost in KiB (64 MiB)
const ARGON2_MEMORY_KIB: u32 = 65536;

/// Argon2id lane count
const ARGON2_PARALLELISM: u32 = 1;

/// A derived room key. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RoomKey([u8; KEY_LEN]);

impl RoomKey {
    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.write_str("RoomKey(..)")
    }
}

/// Derive the room key for an emoji sequence, PIN, and anchor
pub fn derive_key(emojis: &[String], pin: &str, anchor: u64) -> Result<RoomKey> {
    let emoji_str = emojis.concat();
    let password = format!("{emoji_str}:{pin}");

    let salt_input = format!("{SALT_DOMAIN}{emoji_str}:{anchor}");
    let digest = Sha256::digest(salt_input.as_bytes());
    let mut salt = [0u8; 16];
    salt.copy_from_slice(&digest[..16]);

    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), &salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2 derivation failed: {e}")))?;

    Ok(RoomKey(output))
}

/// The key-derivation anchor in force for `creds` at instant `now`
pub fn anchor_at(creds: &RoomCredentials, now: f64) -> u64 {
    match creds.mode() {
        RoomMode::Rotating => bucket_anchor(bucket_at(now)),
        RoomMode::Fixed => creds.created_at() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyphs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_derive_key_deterministic() {
        let id = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]);
        let a = derive_key(&id, "123456", 1_699_999_995).unwrap();
        let b = derive_key(&id, "123456", 1_699_999_995).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_derive_key_sensitive_to_every_input() {
        let id = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]);
        let other_id = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "🍀"]);
        let base = derive_key(&id, "123456", 100).unwrap();

        assert_ne!(
            base.as_bytes(),
            derive_key(&other_id, "123456", 100).unwrap().as_bytes()
        );
        assert_ne!(
            base.as_bytes(),
            derive_key(&id, "123457", 100).unwrap().as_bytes()
        );
        assert_ne!(
            base.as_bytes(),
            derive_key(&id, "123456", 115).unwrap().as_bytes()
        );
    }

    #[test]
    fn test_anchor_rotating_snaps_to_bucket_start() {
        let creds = RoomCredentials::new_rotating(
            glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]),
            1_700_000_000.0,
        )
        .unwrap();
        assert_eq!(anchor_at(&creds, 1_700_000_007.2), 1_699_999_995);
        assert_eq!(anchor_at(&creds, 1_699_999_995.0), 1_699_999_995);
    }

    #[test]
    fn test_anchor_fixed_uses_creation_instant() {
        let creds = RoomCredentials::new_fixed(
            glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]),
            1_700_000_000.9,
            "123456".into(),
        )
        .unwrap();
        // Anchor is whole seconds regardless of when it is evaluated
        assert_eq!(anchor_at(&creds, 1_700_003_000.0), 1_700_000_000);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let id = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]);
        let key = derive_key(&id, "000000", 0).unwrap();
        assert_eq!(format!("{key:?}"), "RoomKey(..)");
    }
}
