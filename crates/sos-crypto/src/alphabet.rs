//! The 32-glyph emoji alphabet
//!
//! Glyph order is part of the protocol: five bits per glyph, six glyphs
//! per room id. Both endpoints must agree on indices exactly, so the
//! table below is frozen; appending is a protocol version bump.

use rand::seq::SliceRandom;
use rand::thread_rng;

/// Number of glyphs in a room id
pub const ROOM_ID_LEN: usize = 6;

/// The protocol alphabet: 32 visually distinct, verbally describable glyphs
pub const EMOJI_SET: [&str; 32] = [
    "🔥", "🌙", "⭐", "🎯", "🌊", "💎", "🍀", "🎲",
    "🚀", "🌈", "⚡", "🎵", "🔑", "🌸", "🍄", "🦋",
    "🎪", "🌵", "🍎", "🐋", "🦊", "🌻", "🎭", "🔔",
    "🏔️", "🌴", "🍕", "🐙", "🦉", "🌺", "🎨", "🔮",
];

/// Phonetic names aligned index-for-index with [`EMOJI_SET`], for reading
/// a room id over a voice channel
pub const EMOJI_PHONETICS: [&str; 32] = [
    "fire", "moon", "star", "target",
    "wave", "gem", "clover", "dice",
    "rocket", "rainbow", "bolt", "music",
    "key", "bloom", "shroom", "butterfly",
    "circus", "cactus", "apple", "whale",
    "fox", "sunflower", "mask", "bell",
    "mountain", "palm", "pizza", "octopus",
    "owl", "hibiscus", "palette", "crystal",
];

/// Look up a glyph's index in the alphabet
pub fn glyph_index(glyph: &str) -> Option<usize> {
    EMOJI_SET.iter().position(|g| *g == glyph)
}

/// Phonetic name for a glyph, if it belongs to the alphabet
pub fn phonetic(glyph: &str) -> Option<&'static str> {
    glyph_index(glyph).map(|i| EMOJI_PHONETICS[i])
}

/// Glyph for a phonetic name (case-insensitive), if it belongs to the alphabet
pub fn from_phonetic(name: &str) -> Option<&'static str> {
    let lowered = name.to_ascii_lowercase();
    EMOJI_PHONETICS
        .iter()
        .position(|p| *p == lowered)
        .map(|i| EMOJI_SET[i])
}

/// Generate a fresh random room id of [`ROOM_ID_LEN`] glyphs
pub fn generate_room_id() -> Vec<String> {
    let mut rng = thread_rng();
    (0..ROOM_ID_LEN)
        .map(|_| {
            EMOJI_SET
                .choose(&mut rng)
                .map(|g| (*g).to_string())
                .unwrap_or_else(|| EMOJI_SET[0].to_string())
        })
        .collect()
}

/// Convert glyphs to alphabet indices, skipping unknown glyphs
pub fn glyphs_to_indices(glyphs: &[String]) -> Vec<usize> {
    glyphs.iter().filter_map(|g| glyph_index(g)).collect()
}

/// Convert alphabet indices back to glyphs, skipping out-of-range indices
pub fn indices_to_glyphs(indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .filter_map(|&i| EMOJI_SET.get(i).map(|g| (*g).to_string()))
        .collect()
}
