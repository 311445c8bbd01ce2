//! Quality profiles: the per-artist ranking and upgrade policy.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{FormatTag, Quality};

/// How proper/repack re-releases of an already-held tier are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProperPolicy {
    /// A higher revision ranks higher and replaces a held release.
    #[default]
    AllowUpgrade,
    /// A higher revision ranks higher when choosing between releases, but a
    /// held release is never replaced for a revision bump alone.
    PreferButDoNotForce,
    /// Revisions are ignored when ranking: same-tier releases compare equal.
    NeverUpgrade,
}

impl ProperPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllowUpgrade => "allow-upgrade",
            Self::PreferButDoNotForce => "prefer-but-do-not-force",
            Self::NeverUpgrade => "never-upgrade",
        }
    }
}

impl fmt::Display for ProperPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProperPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow-upgrade" => Ok(Self::AllowUpgrade),
            "prefer-but-do-not-force" => Ok(Self::PreferButDoNotForce),
            "never-upgrade" => Ok(Self::NeverUpgrade),
            _ => Err(format!("invalid proper policy: {s}")),
        }
    }
}

/// One ranked entry of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileQualityItem {
    pub quality: Quality,
    pub allowed: bool,
}

impl ProfileQualityItem {
    #[must_use]
    pub fn allowed(quality: Quality) -> Self {
        Self {
            quality,
            allowed: true,
        }
    }

    #[must_use]
    pub fn disallowed(quality: Quality) -> Self {
        Self {
            quality,
            allowed: false,
        }
    }
}

/// Score a profile assigns to a format tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFormatItem {
    pub format: FormatTag,
    pub score: i32,
}

/// Errors found while validating a profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// The same tier appears twice, so ranks would not be a strict order.
    #[error("profile '{profile}' lists quality '{quality}' more than once")]
    DuplicateQuality {
        /// Profile name.
        profile: String,
        /// Duplicated tier name.
        quality: String,
    },

    /// The profile has no quality items at all.
    #[error("profile '{0}' has no quality items")]
    Empty(String),
}

/// Per-artist quality configuration.
///
/// `items` is ordered from lowest to highest preference; a tier's rank is its
/// index in that list. Disallowed items still hold a rank so held releases
/// of a since-disallowed tier can be compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub upgrade_allowed: bool,
    /// Quality id of the cutoff tier.
    pub cutoff: i32,
    pub items: Vec<ProfileQualityItem>,
    #[serde(default)]
    pub format_items: Vec<ProfileFormatItem>,
    #[serde(default)]
    pub min_format_score: i32,
    #[serde(default)]
    pub proper_policy: ProperPolicy,
}

impl QualityProfile {
    /// Checks that ranks form a strict total order.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Empty`] for a profile without items and
    /// [`ProfileError::DuplicateQuality`] when a tier is listed twice.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.items.is_empty() {
            return Err(ProfileError::Empty(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if !seen.insert(item.quality.id) {
                return Err(ProfileError::DuplicateQuality {
                    profile: self.name.clone(),
                    quality: item.quality.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns the rank of a tier, or `None` when the profile does not list it.
    #[must_use]
    pub fn rank(&self, quality: &Quality) -> Option<usize> {
        self.rank_of(quality.id)
    }

    /// Returns the rank of a tier by id.
    #[must_use]
    pub fn rank_of(&self, quality_id: i32) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.quality.id == quality_id)
    }

    /// Returns the rank of the cutoff tier, or `None` when it is not listed.
    #[must_use]
    pub fn cutoff_rank(&self) -> Option<usize> {
        self.rank_of(self.cutoff)
    }

    /// Returns true when the tier is listed and allowed.
    #[must_use]
    pub fn is_allowed(&self, quality: &Quality) -> bool {
        self.items
            .iter()
            .any(|item| item.quality.id == quality.id && item.allowed)
    }

    /// Sums the scores this profile maps to the given tags.
    ///
    /// Tags the profile does not score contribute zero.
    #[must_use]
    pub fn calculate_format_score(&self, formats: &[FormatTag]) -> i32 {
        formats
            .iter()
            .filter_map(|format| {
                self.format_items
                    .iter()
                    .find(|item| item.format.id == format.id)
                    .map(|item| item.score)
            })
            .sum()
    }
}
