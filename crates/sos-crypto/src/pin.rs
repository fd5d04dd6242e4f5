//! PIN generation and the 15-second rotation schedule
//!
//! Rotating rooms derive their PIN from the room id and the current time
//! bucket, so every participant's display flips to the same six digits at
//! the same instant without any coordination traffic.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::credentials::RoomCredentials;
use crate::RoomMode;

/// PIN length in decimal digits
pub const PIN_LEN: usize = 6;

/// Width of a rotation bucket in seconds
pub const ROTATION_PERIOD_SECS: u64 = 15;

/// Generate a uniformly random fixed-mode PIN
pub fn generate_pin() -> String {
    let mut rng = rand::thread_rng();
    (0..PIN_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// The rotation bucket containing `now` (seconds since epoch)
pub fn bucket_at(now: f64) -> u64 {
    (now / ROTATION_PERIOD_SECS as f64).floor() as u64
}

/// Key-derivation anchor for a bucket: the bucket's start instant
pub fn bucket_anchor(bucket: u64) -> u64 {
    bucket * ROTATION_PERIOD_SECS
}

/// Seconds until the current bucket rolls over
pub fn seconds_until_rotation(now: f64) -> u64 {
    ROTATION_PERIOD_SECS - (now as u64 % ROTATION_PERIOD_SECS)
}

/// Derive the rotating PIN for a room id in a given bucket.
///
/// SHA-256 over `"{room_id}:{bucket}"`, first six hex digits, each
/// reduced mod 10. Both endpoints evaluate this locally; nothing about
/// the PIN crosses the wire.
pub fn rotating_pin(emojis: &[String], bucket: u64) -> String {
    let seed = format!("{}:{}", emojis.concat(), bucket);
    let digest = Sha256::digest(seed.as_bytes());
    hex::encode(digest)[..PIN_LEN]
        .bytes()
        .map(|b| {
            let value = match b {
                b'0'..=b'9' => b - b'0',
                _ => b - b'a' + 10,
            };
            char::from(b'0' + value % 10)
        })
        .collect()
}

/// The PIN in force for `creds` at instant `now`
pub fn current_pin(creds: &RoomCredentials, now: f64) -> String {
    match creds.mode() {
        RoomMode::Fixed => creds
            .fixed_pin()
            .map(str::to_string)
            .unwrap_or_else(generate_pin),
        RoomMode::Rotating => rotating_pin(creds.emojis(), bucket_at(now)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyphs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_generate_pin_shape() {
        for _ in 0..32 {
            let pin = generate_pin();
            assert_eq!(pin.len(), PIN_LEN);
            assert!(pin.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(bucket_at(0.0), 0);
        assert_eq!(bucket_at(14.999), 0);
        assert_eq!(bucket_at(15.0), 1);
        assert_eq!(bucket_at(1_700_000_007.2), 1_700_000_007 / 15);
    }

    #[test]
    fn test_bucket_anchor() {
        assert_eq!(bucket_anchor(bucket_at(1_700_000_007.2)), 1_699_999_995);
    }

    #[test]
    fn test_seconds_until_rotation() {
        assert_eq!(seconds_until_rotation(0.0), 15);
        assert_eq!(seconds_until_rotation(14.0), 1);
        assert_eq!(seconds_until_rotation(15.0), 15);
    }

    #[test]
    fn test_rotating_pin_deterministic_within_bucket() {
        let id = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]);
        let a = rotating_pin(&id, 113_333_333);
        let b = rotating_pin(&id, 113_333_333);
        assert_eq!(a, b);
        assert_eq!(a.len(), PIN_LEN);
        assert!(a.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_rotating_pin_changes_across_buckets() {
        let id = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]);
        // Adjacent buckets agreeing is possible but vanishingly unlikely
        // across several; require at least one difference.
        let pins: Vec<String> = (0..8).map(|b| rotating_pin(&id, b)).collect();
        assert!(pins.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_rotating_pin_depends_on_room_id() {
        let a = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]);
        let b = glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "🍀"]);
        assert_ne!(rotating_pin(&a, 7), rotating_pin(&b, 7));
    }

    #[test]
    fn test_hex_digit_mapping() {
        // Seed chosen arbitrarily; pin must equal the first six hex chars
        // of the digest each reduced mod 10.
        let id = glyphs(&["🔮", "🔮", "🔮", "🔮", "🔮", "🔮"]);
        let seed = format!("{}:{}", id.concat(), 42u64);
        let digest = hex::encode(Sha256::digest(seed.as_bytes()));
        let expected: String = digest[..PIN_LEN]
            .chars()
            .map(|c| {
                let v = c.to_digit(16).unwrap() % 10;
                char::from_digit(v, 10).unwrap()
            })
            .collect();
        assert_eq!(rotating_pin(&id, 42), expected);
    }

    #[test]
    fn test_current_pin_fixed_mode() {
        let creds = RoomCredentials::new_fixed(
            glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]),
            1_700_000_000.0,
            "123456".into(),
        )
        .unwrap();
        assert_eq!(current_pin(&creds, 1_700_000_100.0), "123456");
        // Fixed PINs do not rotate
        assert_eq!(current_pin(&creds, 1_700_003_000.0), "123456");
    }

    #[test]
    fn test_current_pin_rotating_mode_tracks_bucket() {
        let creds = RoomCredentials::new_rotating(
            glyphs(&["🔥", "🌙", "⭐", "🎯", "🌊", "💎"]),
            1_700_000_000.0,
        )
        .unwrap();
        let within_bucket_a = current_pin(&creds, 1_700_000_001.0);
        let within_bucket_b = current_pin(&creds, 1_700_000_014.0);
        assert_eq!(within_bucket_a, within_bucket_b);
        assert_eq!(
            within_bucket_a,
            rotating_pin(creds.emojis(), bucket_at(1_700_000_001.0))
        );
    }
}
