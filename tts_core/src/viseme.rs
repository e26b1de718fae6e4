//! Phoneme to viseme classification.
//!
//! The 21 ids follow the Oculus OVR LipSync layout. Renderers are trained
//! against these exact category boundaries, so the table must not drift.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::message::{PhonemeSegment, VisemeEvent};

pub const SILENCE: u8 = 0;

/// Canonical label per viseme id.
pub const VISEME_NAMES: [&str; 21] = [
    "sil", "PP", "FF", "TH", "DD", "kk", "CH", "SS", "nn", "aa", "E", "I", "O", "U", "RR",
    "ai", "au", "oy", "w", "y", "h",
];

/// IPA and ARPAbet-style symbols, lower case.
pub(crate) const PHONEME_TABLE: &[(&str, u8)] = &[
    // silence
    ("pau", 0), ("sil", 0), ("_", 0),
    // bilabial
    ("p", 1), ("b", 1), ("m", 1),
    // labiodental
    ("f", 2), ("v", 2),
    // dental
    ("θ", 3), ("ð", 3), ("th", 3), ("dh", 3),
    // alveolar stops and nasal
    ("t", 4), ("d", 4), ("n", 4),
    // velar
    ("k", 5), ("g", 5), ("ŋ", 5), ("ng", 5),
    // palato-alveolar
    ("tʃ", 6), ("dʒ", 6), ("ʃ", 6), ("ʒ", 6), ("ch", 6), ("sh", 6), ("zh", 6),
    // sibilants
    ("s", 7), ("z", 7),
    // approximants
    ("l", 8), ("r", 8), ("ɹ", 8),
    // open vowels
    ("ɑ", 9), ("ɒ", 9), ("a", 9), ("aa", 9), ("ao", 9),
    // mid-open vowels
    ("ɛ", 10), ("e", 10), ("eh", 10), ("ae", 10),
    // close front vowels
    ("ɪ", 11), ("i", 11), ("ih", 11), ("iy", 11),
    // close-mid back vowels
    ("ɔ", 12), ("o", 12), ("oh", 12), ("ow", 12),
    // close back vowels
    ("ʊ", 13), ("u", 13), ("uh", 13), ("uw", 13),
    // r-colored and central vowels
    ("ɜ", 14), ("ə", 14), ("ɚ", 14), ("ɝ", 14), ("er", 14), ("ah", 14), ("ax", 14),
    // diphthongs
    ("aɪ", 15), ("ay", 15), ("ai", 15),
    ("aʊ", 16), ("aw", 16), ("au", 16),
    ("ɔɪ", 17), ("oy", 17), ("oi", 17),
    // glides; "jh" lands here, not with the affricates
    ("w", 18), ("j", 19), ("y", 19), ("jh", 19),
    // aspirate
    ("h", 20), ("hh", 20),
];

fn table() -> &'static HashMap<&'static str, u8> {
    static TABLE: OnceLock<HashMap<&'static str, u8>> = OnceLock::new();
    TABLE.get_or_init(|| PHONEME_TABLE.iter().copied().collect())
}

/// Map a phoneme symbol to a viseme id in `0..=20`.
///
/// Unknown symbols fall back to silence; backend vocabularies are open-ended.
pub fn classify(phoneme: &str) -> u8 {
    let normalized = phoneme.trim().to_lowercase();
    table().get(normalized.as_str()).copied().unwrap_or(SILENCE)
}

pub fn viseme_name(id: u8) -> &'static str {
    VISEME_NAMES.get(id as usize).copied().unwrap_or(VISEME_NAMES[0])
}

impl From<PhonemeSegment> for VisemeEvent {
    fn from(segment: PhonemeSegment) -> Self {
        let viseme_id = classify(&segment.phoneme);
        let span = (segment.end_sec - segment.start_sec).max(0.0);
        VisemeEvent {
            // float -> int casts saturate, so negative starts become 0
            offset_ms: (segment.start_sec * 1000.0) as u64,
            duration_ms: (span * 1000.0) as u64,
            phoneme: segment.phoneme,
            viseme_id,
            viseme_name: viseme_name(viseme_id),
        }
    }
}
