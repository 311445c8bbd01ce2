//! Profile and release-metadata admission rules.

use super::{DecisionSettings, EvaluationContext, Specification, SpecificationKind, Verdict};
use crate::quality::QualityProfile;
use crate::release::{Candidate, DownloadProtocol};
use crate::upgrade;

const BYTES_PER_MB: u64 = 1024 * 1024;
const MINUTES_PER_DAY: u64 = 24 * 60;

fn megabytes(bytes: u64) -> String {
    format!("{} MB", bytes / BYTES_PER_MB)
}

/// Rejects tiers the profile does not allow, and candidates that target no
/// album at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityAllowedSpecification;

impl Specification for QualityAllowedSpecification {
    fn kind(&self) -> SpecificationKind {
        SpecificationKind::QualityAllowed
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        profile: &QualityProfile,
        _context: &EvaluationContext<'_>,
    ) -> Verdict {
        if candidate.album_ids.is_empty() {
            return Verdict::missing_metadata(self.kind(), "album_ids");
        }
        if profile.is_allowed(&candidate.quality.quality) {
            Verdict::Accept
        } else {
            Verdict::reject(
                self.kind(),
                format!(
                    "Quality {} is not wanted in profile {}",
                    candidate.quality.quality, profile.name
                ),
            )
        }
    }
}

/// Rejects upgrades of held albums when the profile disables upgrades.
///
/// Only a real upgrade is blocked: equal or worse candidates pass, and so
/// does a proper that the profile prefers but does not force.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradePermittedSpecification;

impl Specification for UpgradePermittedSpecification {
    fn kind(&self) -> SpecificationKind {
        SpecificationKind::UpgradePermitted
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        profile: &QualityProfile,
        context: &EvaluationContext<'_>,
    ) -> Verdict {
        if profile.upgrade_allowed {
            return Verdict::Accept;
        }

        let blocked = context.held.iter().find(|held| {
            held.artist_id == candidate.artist_id
                && candidate.album_ids.contains(&held.album_id)
                && upgrade::is_upgrade(profile, *held, candidate)
        });

        match blocked {
            Some(held) => Verdict::reject(
                self.kind(),
                format!(
                    "Existing file ({}) would be upgraded and profile {} does not allow upgrades",
                    held.quality, profile.name
                ),
            ),
            None => Verdict::Accept,
        }
    }
}

/// Rejects candidates whose format score is below the profile minimum.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumFormatScoreSpecification;

impl Specification for MinimumFormatScoreSpecification {
    fn kind(&self) -> SpecificationKind {
        SpecificationKind::MinimumFormatScore
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        profile: &QualityProfile,
        _context: &EvaluationContext<'_>,
    ) -> Verdict {
        let score = profile.calculate_format_score(&candidate.formats);
        if score >= profile.min_format_score {
            Verdict::Accept
        } else {
            Verdict::reject(
                self.kind(),
                format!(
                    "Custom format score {score} is below the minimum of {}",
                    profile.min_format_score
                ),
            )
        }
    }
}

/// Size bounds, applied per album so multi-album releases scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeSpecification {
    min_size: Option<u64>,
    max_size: Option<u64>,
}

impl SizeSpecification {
    #[must_use]
    pub fn new(settings: &DecisionSettings) -> Self {
        Self {
            min_size: settings.min_size,
            max_size: settings.max_size,
        }
    }
}

impl Specification for SizeSpecification {
    fn kind(&self) -> SpecificationKind {
        SpecificationKind::Size
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        _profile: &QualityProfile,
        _context: &EvaluationContext<'_>,
    ) -> Verdict {
        if self.min_size.is_none() && self.max_size.is_none() {
            return Verdict::Accept;
        }
        let Some(size) = candidate.release.size else {
            return Verdict::missing_metadata(self.kind(), "size");
        };

        let albums = u64::try_from(candidate.album_ids.len().max(1)).unwrap_or(1);
        if let Some(min) = self.min_size.map(|min| min.saturating_mul(albums)) {
            if size < min {
                return Verdict::reject(
                    self.kind(),
                    format!(
                        "{} is smaller than the minimum allowed {}",
                        megabytes(size),
                        megabytes(min)
                    ),
                );
            }
        }
        if let Some(max) = self.max_size.map(|max| max.saturating_mul(albums)) {
            if size > max {
                return Verdict::reject(
                    self.kind(),
                    format!(
                        "{} is larger than the maximum allowed {}",
                        megabytes(size),
                        megabytes(max)
                    ),
                );
            }
        }
        Verdict::Accept
    }
}

/// Minimum seeders for torrent releases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedersSpecification {
    min_seeders: Option<u32>,
}

impl SeedersSpecification {
    #[must_use]
    pub fn new(settings: &DecisionSettings) -> Self {
        Self {
            min_seeders: settings.min_seeders,
        }
    }
}

impl Specification for SeedersSpecification {
    fn kind(&self) -> SpecificationKind {
        SpecificationKind::Seeders
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        _profile: &QualityProfile,
        _context: &EvaluationContext<'_>,
    ) -> Verdict {
        let Some(min) = self.min_seeders else {
            return Verdict::Accept;
        };
        if candidate.release.protocol != DownloadProtocol::Torrent {
            return Verdict::Accept;
        }
        match candidate.release.seeders {
            None => Verdict::missing_metadata(self.kind(), "seeders"),
            Some(seeders) if seeders < min => Verdict::reject(
                self.kind(),
                format!("Not enough seeders: {seeders}. Minimum seeders: {min}"),
            ),
            Some(_) => Verdict::Accept,
        }
    }
}

/// Usenet retention and minimum age.
///
/// Minimum age is skipped for interactive searches; a user picking a fresh
/// post by hand gets it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeSpecification {
    retention_days: Option<u64>,
    minimum_age_minutes: Option<u64>,
}

impl AgeSpecification {
    #[must_use]
    pub fn new(settings: &DecisionSettings) -> Self {
        Self {
            retention_days: settings.retention_days,
            minimum_age_minutes: settings.minimum_age_minutes,
        }
    }
}

impl Specification for AgeSpecification {
    fn kind(&self) -> SpecificationKind {
        SpecificationKind::Age
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        _profile: &QualityProfile,
        context: &EvaluationContext<'_>,
    ) -> Verdict {
        if candidate.release.protocol != DownloadProtocol::Usenet {
            return Verdict::Accept;
        }
        let retention = self.retention_days.filter(|days| *days > 0);
        let minimum_age = self
            .minimum_age_minutes
            .filter(|minutes| *minutes > 0 && !context.is_interactive());
        if retention.is_none() && minimum_age.is_none() {
            return Verdict::Accept;
        }
        let Some(age) = candidate.release.age_minutes else {
            return Verdict::missing_metadata(self.kind(), "age");
        };

        if let Some(days) = retention {
            if age > days.saturating_mul(MINUTES_PER_DAY) {
                return Verdict::reject(
                    self.kind(),
                    format!(
                        "{} days old, older than retention of {days} days",
                        age / MINUTES_PER_DAY
                    ),
                );
            }
        }
        if let Some(minimum) = minimum_age {
            if age < minimum {
                return Verdict::reject(
                    self.kind(),
                    format!("Only {age} minutes old, minimum age is {minimum} minutes"),
                );
            }
        }
        Verdict::Accept
    }
}

/// Rejects encrypted releases when configured to.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionSpecification {
    reject_encrypted: bool,
}

impl EncryptionSpecification {
    #[must_use]
    pub fn new(settings: &DecisionSettings) -> Self {
        Self {
            reject_encrypted: settings.reject_encrypted,
        }
    }
}

impl Specification for EncryptionSpecification {
    fn kind(&self) -> SpecificationKind {
        SpecificationKind::Encryption
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        _profile: &QualityProfile,
        _context: &EvaluationContext<'_>,
    ) -> Verdict {
        if self.reject_encrypted && candidate.release.encrypted {
            Verdict::reject(self.kind(), "Release is encrypted")
        } else {
            Verdict::Accept
        }
    }
}
