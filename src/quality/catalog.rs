//! Default audio quality catalog.
//!
//! Tiers are listed from lowest to highest preference. [`default_profile`]
//! builds a profile in that order so callers get a sensible ranking without
//! hand-writing one.

use super::{ProperPolicy, ProfileQualityItem, Quality, QualityProfile};

pub const UNKNOWN: i32 = 0;
pub const MP3_008: i32 = 1;
pub const MP3_096: i32 = 2;
pub const MP3_128: i32 = 3;
pub const MP3_160: i32 = 4;
pub const MP3_192: i32 = 5;
pub const MP3_VBR_V2: i32 = 6;
pub const MP3_256: i32 = 7;
pub const MP3_VBR_V0: i32 = 8;
pub const MP3_320: i32 = 9;
pub const AAC_256: i32 = 10;
pub const AAC_320: i32 = 11;
pub const ALAC: i32 = 12;
pub const FLAC: i32 = 13;
pub const FLAC_24: i32 = 14;
pub const WAV: i32 = 15;

const DEFAULT_TIERS: [(i32, &str); 16] = [
    (UNKNOWN, "Unknown"),
    (MP3_008, "MP3-8"),
    (MP3_096, "MP3-96"),
    (MP3_128, "MP3-128"),
    (MP3_160, "MP3-160"),
    (MP3_192, "MP3-192"),
    (MP3_VBR_V2, "MP3-VBR-V2"),
    (MP3_256, "MP3-256"),
    (MP3_VBR_V0, "MP3-VBR-V0"),
    (MP3_320, "MP3-320"),
    (AAC_256, "AAC-256"),
    (AAC_320, "AAC-320"),
    (ALAC, "ALAC"),
    (FLAC, "FLAC"),
    (FLAC_24, "FLAC 24bit"),
    (WAV, "WAV"),
];

/// Returns every catalog tier, lowest preference first.
#[must_use]
pub fn default_qualities() -> Vec<Quality> {
    DEFAULT_TIERS
        .iter()
        .map(|(id, name)| Quality::new(*id, *name))
        .collect()
}

/// Looks up a catalog tier by id.
#[must_use]
pub fn find(id: i32) -> Option<Quality> {
    DEFAULT_TIERS
        .iter()
        .find(|(tier_id, _)| *tier_id == id)
        .map(|(tier_id, name)| Quality::new(*tier_id, *name))
}

/// Looks up a catalog tier by id, falling back to `Unknown`.
#[must_use]
pub fn get(id: i32) -> Quality {
    find(id).unwrap_or_else(|| Quality::new(UNKNOWN, "Unknown"))
}

/// Builds a profile allowing every catalog tier with the given cutoff.
///
/// Upgrades are allowed, no format scores are mapped and propers upgrade.
#[must_use]
pub fn default_profile(cutoff: i32) -> QualityProfile {
    QualityProfile {
        id: 1,
        name: "Any".to_string(),
        upgrade_allowed: true,
        cutoff,
        items: default_qualities()
            .into_iter()
            .map(ProfileQualityItem::allowed)
            .collect(),
        format_items: Vec::new(),
        min_format_score: 0,
        proper_policy: ProperPolicy::AllowUpgrade,
    }
}
