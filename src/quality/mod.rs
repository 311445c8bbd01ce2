//! Ranking model: quality tiers, revisions and quality profiles.
//!
//! A [`Quality`] is a named tier with a stable identity. It carries no rank of
//! its own; its rank is its position in a [`QualityProfile`]'s ordered item
//! list. A [`Revision`] is the secondary ordering key used to tell a
//! proper/repack apart from the original release of the same tier.
//!
//! The default catalog in [`catalog`] is plain reference data. Callers pass
//! profiles built from it explicitly into the comparator; nothing here is
//! process-global.

pub mod catalog;
mod format;
mod profile;

pub use format::FormatTag;
pub use profile::{
    ProfileError, ProfileFormatItem, ProfileQualityItem, ProperPolicy, QualityProfile,
};

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A named quality tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quality {
    /// Stable identity, used for profile lookups.
    pub id: i32,
    /// Display name.
    pub name: String,
}

impl Quality {
    /// Creates a quality tier.
    #[must_use]
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Re-release marker for releases of the same tier.
///
/// `version` 1 is an original release, 2+ a proper/repack. `real` counts
/// "REAL" tags, which outrank any version bump of the same release group.
/// The repack flag is informational and does not take part in ordering or
/// equality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Revision {
    pub version: i32,
    #[serde(default)]
    pub real: i32,
    #[serde(default)]
    pub is_repack: bool,
}

impl Revision {
    /// Creates a revision with the given version and no real/repack markers.
    #[must_use]
    pub fn new(version: i32) -> Self {
        Self {
            version,
            real: 0,
            is_repack: false,
        }
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.real == other.real
    }
}

impl Eq for Revision {}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.real
            .cmp(&other.real)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A release's tier together with its revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityModel {
    pub quality: Quality,
    #[serde(default)]
    pub revision: Revision,
}

impl QualityModel {
    /// Creates a model for an original (version 1) release.
    #[must_use]
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            revision: Revision::default(),
        }
    }

    /// Creates a model with an explicit revision.
    #[must_use]
    pub fn with_revision(quality: Quality, revision: Revision) -> Self {
        Self { quality, revision }
    }
}

impl fmt::Display for QualityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.revision.version > 1 || self.revision.real > 0 {
            write!(
                f,
                "{} v{}{}",
                self.quality,
                self.revision.version,
                if self.revision.real > 0 { " REAL" } else { "" }
            )
        } else {
            write!(f, "{}", self.quality)
        }
    }
}
