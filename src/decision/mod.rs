//! Admission chain: ordered specifications that accept or reject a candidate.
//!
//! # Overview
//!
//! - [`Specification`] - One independent admission rule
//! - [`AdmissionChain`] - Ordered rules; the first rejection wins
//! - [`Verdict`] - Accept, or reject with the rule and a reason
//! - [`DecisionSettings`] - Thresholds for the metadata rules
//! - [`build_default_admission_chain`] - All rules in [`DEFAULT_SPECIFICATION_ORDER`]
//!
//! Rejections are values, not errors. A candidate missing the metadata a rule
//! needs is rejected with a missing-metadata reason.

mod queue;
mod specs;

pub use queue::{QueueEntry, QueueSnapshot, QueueSpecification, SharedQueue};
pub use specs::{
    AgeSpecification, EncryptionSpecification, MinimumFormatScoreSpecification,
    QualityAllowedSpecification, SeedersSpecification, SizeSpecification,
    UpgradePermittedSpecification,
};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::quality::QualityProfile;
use crate::release::{Candidate, LibraryItem};

/// Identifies an admission rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecificationKind {
    QualityAllowed,
    UpgradePermitted,
    MinimumFormatScore,
    Size,
    Seeders,
    Age,
    Encryption,
    QueueConflict,
}

impl SpecificationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QualityAllowed => "quality_allowed",
            Self::UpgradePermitted => "upgrade_permitted",
            Self::MinimumFormatScore => "minimum_format_score",
            Self::Size => "size",
            Self::Seeders => "seeders",
            Self::Age => "age",
            Self::Encryption => "encryption",
            Self::QueueConflict => "queue_conflict",
        }
    }
}

impl fmt::Display for SpecificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evaluation order of [`build_default_admission_chain`].
///
/// Cheap profile checks run first; the queue check reads shared state and
/// runs last.
pub const DEFAULT_SPECIFICATION_ORDER: [SpecificationKind; 8] = [
    SpecificationKind::QualityAllowed,
    SpecificationKind::UpgradePermitted,
    SpecificationKind::MinimumFormatScore,
    SpecificationKind::Size,
    SpecificationKind::Seeders,
    SpecificationKind::Age,
    SpecificationKind::Encryption,
    SpecificationKind::QueueConflict,
];

/// Why a candidate was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub specification: SpecificationKind,
    pub reason: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.specification)
    }
}

/// Outcome of evaluating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Reject(Rejection),
}

impl Verdict {
    #[must_use]
    pub fn reject(specification: SpecificationKind, reason: impl Into<String>) -> Self {
        Self::Reject(Rejection {
            specification,
            reason: reason.into(),
        })
    }

    /// Rejection for a candidate lacking `field`.
    #[must_use]
    pub fn missing_metadata(specification: SpecificationKind, field: &str) -> Self {
        Self::reject(specification, format!("Missing metadata: {field}"))
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }

    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accept => None,
            Self::Reject(rejection) => Some(rejection),
        }
    }
}

/// What started the search that produced the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// RSS sync or a search started without a user picking releases.
    Automatic,
    /// A user is choosing releases by hand.
    Interactive,
}

impl SearchKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Interactive => "interactive",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "automatic" => Ok(Self::Automatic),
            "interactive" => Ok(Self::Interactive),
            _ => Err(format!(
                "invalid search kind: {s} (expected automatic or interactive)"
            )),
        }
    }
}

/// Optional inputs beyond the candidate and profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationContext<'a> {
    /// Kind of the search in flight, if any.
    pub search: Option<SearchKind>,
    /// Library items already held for the candidate's artist.
    pub held: &'a [LibraryItem],
}

impl<'a> EvaluationContext<'a> {
    #[must_use]
    pub fn new(search: Option<SearchKind>, held: &'a [LibraryItem]) -> Self {
        Self { search, held }
    }

    /// Returns true when a user is picking releases by hand.
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.search == Some(SearchKind::Interactive)
    }
}

/// Thresholds for the metadata rules. `None` disables a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionSettings {
    /// Minimum release size per album, in bytes.
    pub min_size: Option<u64>,
    /// Maximum release size per album, in bytes.
    pub max_size: Option<u64>,
    pub min_seeders: Option<u32>,
    /// Usenet retention; older posts are unavailable.
    pub retention_days: Option<u64>,
    /// Usenet posts younger than this are held back.
    pub minimum_age_minutes: Option<u64>,
    pub reject_encrypted: bool,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            min_size: None,
            max_size: None,
            min_seeders: None,
            retention_days: None,
            minimum_age_minutes: None,
            reject_encrypted: true,
        }
    }
}

/// One independent admission rule.
pub trait Specification: Send + Sync {
    fn kind(&self) -> SpecificationKind;

    /// Accepts or rejects `candidate`. Must not panic on missing metadata.
    fn evaluate(
        &self,
        candidate: &Candidate,
        profile: &QualityProfile,
        context: &EvaluationContext<'_>,
    ) -> Verdict;
}

/// Ordered admission rules evaluated with short-circuit on first rejection.
#[derive(Default)]
pub struct AdmissionChain {
    specifications: Vec<Box<dyn Specification>>,
}

impl AdmissionChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule; rules run in registration order.
    pub fn register(&mut self, specification: Box<dyn Specification>) {
        debug!(specification = %specification.kind(), "registering specification");
        self.specifications.push(specification);
    }

    /// Returns the registered rules in evaluation order.
    #[must_use]
    pub fn kinds(&self) -> Vec<SpecificationKind> {
        self.specifications.iter().map(|spec| spec.kind()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specifications.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specifications.is_empty()
    }

    /// Evaluates `candidate`; the first rejection is returned and later rules
    /// are not consulted.
    #[must_use]
    #[instrument(skip_all, fields(release = %candidate.release.title, profile = %profile.name))]
    pub fn evaluate(
        &self,
        candidate: &Candidate,
        profile: &QualityProfile,
        context: &EvaluationContext<'_>,
    ) -> Verdict {
        for specification in &self.specifications {
            let verdict = specification.evaluate(candidate, profile, context);
            debug!(
                specification = %specification.kind(),
                accepted = verdict.is_accepted(),
                "specification evaluated"
            );
            if let Some(rejection) = verdict.rejection() {
                info!(
                    specification = %rejection.specification,
                    reason = %rejection.reason,
                    "release rejected"
                );
                return verdict;
            }
        }
        Verdict::Accept
    }
}

/// Builds the chain with every rule in [`DEFAULT_SPECIFICATION_ORDER`].
#[must_use]
pub fn build_default_admission_chain(
    settings: &DecisionSettings,
    queue: Arc<dyn QueueSnapshot>,
) -> AdmissionChain {
    let mut chain = AdmissionChain::new();
    chain.register(Box::new(QualityAllowedSpecification));
    chain.register(Box::new(UpgradePermittedSpecification));
    chain.register(Box::new(MinimumFormatScoreSpecification));
    chain.register(Box::new(SizeSpecification::new(settings)));
    chain.register(Box::new(SeedersSpecification::new(settings)));
    chain.register(Box::new(AgeSpecification::new(settings)));
    chain.register(Box::new(EncryptionSpecification::new(settings)));
    chain.register(Box::new(QueueSpecification::new(queue)));
    chain
}
