//! Room credentials and fingerprints
//!
//! The emoji sequence and PIN never leave the client. The relay is handed
//! only the fingerprint: the first 16 lowercase hex characters of
//! SHA-256 over the concatenated glyphs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::alphabet::{self, ROOM_ID_LEN};
use crate::error::{CryptoError, Result};
use crate::pin;

/// Length of a room fingerprint in hex characters (first 8 bytes of SHA-256)
pub const FINGERPRINT_LEN: usize = 16;

/// How a room's PIN behaves over its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    /// PIN is derived from the room id and the current 15-second bucket
    Rotating,
    /// PIN is chosen once at creation and stays constant
    Fixed,
}

impl std::fmt::Display for RoomMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rotating => write!(f, "rotating"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}

impl std::str::FromStr for RoomMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "rotating" => Ok(Self::Rotating),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!("unknown room mode '{other}'")),
        }
    }
}

/// Client-side room identity and key-derivation inputs. Never transmitted.
#[derive(Debug, Clone)]
pub struct RoomCredentials {
    emojis: Vec<String>,
    mode: RoomMode,
    created_at: f64,
    fixed_pin: Option<String>,
}

impl RoomCredentials {
    /// Credentials for a rotating-PIN room
    pub fn new_rotating(emojis: Vec<String>, created_at: f64) -> Result<Self> {
        validate_room_id(&emojis)?;
        Ok(Self {
            emojis,
            mode: RoomMode::Rotating,
            created_at,
            fixed_pin: None,
        })
    }

    /// Credentials for a fixed-PIN room
    pub fn new_fixed(emojis: Vec<String>, created_at: f64, fixed_pin: String) -> Result<Self> {
        validate_room_id(&emojis)?;
        if fixed_pin.len() != pin::PIN_LEN || !fixed_pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CryptoError::InvalidPin(format!(
                "expected {} decimal digits",
                pin::PIN_LEN
            )));
        }
        Ok(Self {
            emojis,
            mode: RoomMode::Fixed,
            created_at,
            fixed_pin: Some(fixed_pin),
        })
    }

    /// Fresh credentials with a random room id, for the room creator
    pub fn generate(mode: RoomMode, now: f64) -> Self {
        let emojis = alphabet::generate_room_id();
        let fixed_pin = match mode {
            RoomMode::Fixed => Some(pin::generate_pin()),
            RoomMode::Rotating => None,
        };
        Self {
            emojis,
            mode,
            created_at: now,
            fixed_pin,
        }
    }

    /// The six glyphs of the room id
    pub fn emojis(&self) -> &[String] {
        &self.emojis
    }

    /// PIN behavior of this room
    pub fn mode(&self) -> RoomMode {
        self.mode
    }

    /// Creation instant, seconds since epoch. For fixed mode this is the
    /// key-derivation anchor and must match the server's record.
    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// Adopt the server-echoed creation time. Joiners call this after a
    /// successful join so fixed-mode key derivation anchors on the same
    /// instant as the creator's.
    pub fn set_created_at(&mut self, created_at: f64) {
        self.created_at = created_at;
    }

    /// The fixed PIN, present iff `mode` is [`RoomMode::Fixed`]
    pub fn fixed_pin(&self) -> Option<&str> {
        self.fixed_pin.as_deref()
    }

    /// All glyphs concatenated, the unit fingerprints and salts hash over
    pub fn room_id_string(&self) -> String {
        self.emojis.concat()
    }

    /// Fingerprint the relay indexes this room under
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.emojis)
    }

    /// Room id as space-separated phonetic words, for verbal sharing
    pub fn phonetic_readout(&self) -> String {
        self.emojis
            .iter()
            .map(|g| alphabet::phonetic(g).unwrap_or(g.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn validate_room_id(emojis: &[String]) -> Result<()> {
    if emojis.len() != ROOM_ID_LEN {
        return Err(CryptoError::InvalidRoomId(format!(
            "expected {} glyphs, got {}",
            ROOM_ID_LEN,
            emojis.len()
        )));
    }
    for glyph in emojis {
        if alphabet::glyph_index(glyph).is_none() {
            return Err(CryptoError::InvalidRoomId(format!(
                "glyph '{glyph}' is not in the protocol alphabet"
            )));
        }
    }
    Ok(())
}

/// Compute the relay-visible fingerprint of an emoji sequence: the first
/// [`FINGERPRINT_LEN`] lowercase hex characters of SHA-256 over the
/// concatenated UTF-8 glyphs.
pub fn fingerprint(emojis: &[String]) -> String {
    let digest = Sha256::digest(emojis.concat().as_bytes());
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

/// Check that a string is a well-formed fingerprint: exactly 16 lowercase
/// hex characters.
pub fn is_valid_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyphs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = fingerprint(&glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]));
        assert!(is_valid_fingerprint(&fp), "bad fingerprint: {fp}");
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_id_sensitive() {
        let a = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]);
        let b = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "🍀"]);
        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_is_valid_fingerprint_rejects_bad_input() {
        assert!(is_valid_fingerprint("a1b2c3d4e5f6a7b8"));
        assert!(!is_valid_fingerprint("a1b2c3d4e5f6a7b")); // short
        assert!(!is_valid_fingerprint("a1b2c3d4e5f6a7b80")); // long
        assert!(!is_valid_fingerprint("A1B2C3D4E5F6A7B8")); // uppercase
        assert!(!is_valid_fingerprint("g1b2c3d4e5f6a7b8")); // non-hex
    }

    #[test]
    fn test_rotating_credentials_have_no_pin() {
        let creds = RoomCredentials::generate(RoomMode::Rotating, 1_700_000_000.0);
        assert_eq!(creds.mode(), RoomMode::Rotating);
        assert!(creds.fixed_pin().is_none());
    }

    #[test]
    fn test_fixed_credentials_have_pin() {
        let creds = RoomCredentials::generate(RoomMode::Fixed, 1_700_000_000.0);
        assert_eq!(creds.mode(), RoomMode::Fixed);
        let pin = creds.fixed_pin().expect("fixed room must carry a PIN");
        assert_eq!(pin.len(), 6);
        assert!(pin.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_new_fixed_rejects_bad_pin() {
        let emojis = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]);
        assert!(RoomCredentials::new_fixed(emojis.clone(), 0.0, "12345".into()).is_err());
        assert!(RoomCredentials::new_fixed(emojis, 0.0, "12345a".into()).is_err());
    }

    #[test]
    fn test_room_id_length_enforced() {
        let err = RoomCredentials::new_rotating(glyphs(&["🔥"]), 0.0);
        assert!(matches!(err, Err(CryptoError::InvalidRoomId(_))));
    }

    #[test]
    fn test_room_id_membership_enforced() {
        let err = RoomCredentials::new_rotating(glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💩"]), 0.0);
        assert!(matches!(err, Err(CryptoError::InvalidRoomId(_))));
    }

    #[test]
    fn test_phonetic_readout() {
        let creds =
            RoomCredentials::new_rotating(glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]), 0.0)
                .unwrap();
        assert_eq!(creds.phonetic_readout(), "fire moon star target wave gem");
    }

    #[test]
    fn test_joiner_adopts_server_created_at() {
        let mut creds =
            RoomCredentials::new_rotating(glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]), 100.0)
                .unwrap();
        creds.set_created_at(42.5);
        assert_eq!(creds.created_at(), 42.5);
    }
}
