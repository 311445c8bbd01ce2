//! Upgrade comparator: ranks two graded releases against a profile.
//!
//! Criteria are evaluated in strict order and the first decisive one wins:
//!
//! 1. Tier rank within the profile
//! 2. Revision (skipped under [`ProperPolicy::NeverUpgrade`])
//! 3. Aggregate format score
//!
//! A tier the profile does not list ranks below every listed tier. Such a
//! configuration inconsistency never raises; it simply makes the item lose
//! on rank and never meet the cutoff.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::quality::{ProperPolicy, QualityProfile};
use crate::release::Graded;

/// How a candidate ranks relative to the item it is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    Better,
    Worse,
    Equal,
}

impl Preference {
    /// Returns the preference seen from the other side of the comparison.
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Better => Self::Worse,
            Self::Worse => Self::Better,
            Self::Equal => Self::Equal,
        }
    }

    fn from_ordering(ordering: Ordering) -> Option<Self> {
        match ordering {
            Ordering::Greater => Some(Self::Better),
            Ordering::Less => Some(Self::Worse),
            Ordering::Equal => None,
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Better => "better",
            Self::Worse => "worse",
            Self::Equal => "equal",
        };
        write!(f, "{label}")
    }
}

/// Compares `candidate` against `held` under `profile`.
///
/// The result describes the candidate: [`Preference::Better`] means the
/// candidate is preferred over the held item. The comparison is
/// rank-symmetric; whether an upgrade is permitted is decided by the
/// admission chain, not here.
#[must_use]
pub fn compare(
    profile: &QualityProfile,
    held: &impl Graded,
    candidate: &impl Graded,
) -> Preference {
    let held_rank = profile.rank(&held.quality().quality);
    let candidate_rank = profile.rank(&candidate.quality().quality);
    if let Some(preference) = Preference::from_ordering(candidate_rank.cmp(&held_rank)) {
        trace!(?held_rank, ?candidate_rank, %preference, "decided on tier rank");
        return preference;
    }

    if profile.proper_policy != ProperPolicy::NeverUpgrade {
        let ordering = candidate
            .quality()
            .revision
            .cmp(&held.quality().revision);
        if let Some(preference) = Preference::from_ordering(ordering) {
            trace!(%preference, "decided on revision");
            return preference;
        }
    }

    let held_score = profile.calculate_format_score(held.formats());
    let candidate_score = profile.calculate_format_score(candidate.formats());
    let preference =
        Preference::from_ordering(candidate_score.cmp(&held_score)).unwrap_or(Preference::Equal);
    trace!(held_score, candidate_score, %preference, "decided on format score");
    preference
}

/// Returns true when the item's tier is at or past the cutoff and its format
/// score reaches the profile minimum.
///
/// An item whose tier, or a profile whose cutoff, is missing from the ranking
/// is treated as cutoff unmet.
#[must_use]
pub fn cutoff_met(profile: &QualityProfile, item: &impl Graded) -> bool {
    let (Some(rank), Some(cutoff_rank)) =
        (profile.rank(&item.quality().quality), profile.cutoff_rank())
    else {
        return false;
    };

    rank >= cutoff_rank
        && profile.calculate_format_score(item.formats()) >= profile.min_format_score
}

/// Returns true when the candidate is the same tier as `held` with a strictly
/// higher revision.
#[must_use]
pub fn is_revision_upgrade(held: &impl Graded, candidate: &impl Graded) -> bool {
    held.quality().quality.id == candidate.quality().quality.id
        && candidate.quality().revision > held.quality().revision
}

/// Returns true when the candidate should replace a held item.
///
/// Same as [`compare`] returning [`Preference::Better`], except that under
/// [`ProperPolicy::PreferButDoNotForce`] a revision bump alone does not
/// replace a held item.
#[must_use]
pub fn is_upgrade(profile: &QualityProfile, held: &impl Graded, candidate: &impl Graded) -> bool {
    if profile.proper_policy == ProperPolicy::PreferButDoNotForce
        && is_revision_upgrade(held, candidate)
    {
        return false;
    }
    compare(profile, held, candidate) == Preference::Better
}

/// Returns the items whose cutoff is not yet met, preserving input order.
#[must_use]
pub fn cutoff_unmet<'a, T: Graded>(profile: &QualityProfile, items: &'a [T]) -> Vec<&'a T> {
    items
        .iter()
        .filter(|item| !cutoff_met(profile, *item))
        .collect()
}
