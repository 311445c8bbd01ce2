//! Queue conflict rule: no duplicate or inferior concurrent grabs.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{EvaluationContext, Specification, SpecificationKind, Verdict};
use crate::quality::QualityProfile;
use crate::release::Candidate;
use crate::tracking::TrackedDownloadState;
use crate::upgrade;

/// An in-flight grab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub candidate: Candidate,
    #[serde(default)]
    pub state: TrackedDownloadState,
    #[serde(default)]
    pub download_id: Option<String>,
}

impl QueueEntry {
    #[must_use]
    pub fn new(candidate: Candidate, state: TrackedDownloadState) -> Self {
        Self {
            candidate,
            state,
            download_id: None,
        }
    }
}

/// Read access to the current download queue.
///
/// Implementations return a copy; the rule never holds a lock while comparing.
pub trait QueueSnapshot: Send + Sync {
    fn current(&self) -> Vec<QueueEntry>;
}

/// In-process queue shared between the grabber and the admission chain.
#[derive(Debug, Default)]
pub struct SharedQueue {
    entries: RwLock<Vec<QueueEntry>>,
}

impl SharedQueue {
    #[must_use]
    pub fn new(entries: Vec<QueueEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn push(&self, entry: QueueEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Replaces the whole queue, e.g. after polling the download clients.
    pub fn replace(&self, entries: Vec<QueueEntry>) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }
}

impl QueueSnapshot for SharedQueue {
    fn current(&self) -> Vec<QueueEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Rejects candidates that collide with an in-flight grab for the same albums.
///
/// Multi-album candidates are blocked by any overlapping entry. A single-album
/// candidate must be strictly better than every live overlapping entry; failed
/// entries do not block it, and with upgrades disabled any live entry does.
pub struct QueueSpecification {
    queue: Arc<dyn QueueSnapshot>,
}

impl QueueSpecification {
    #[must_use]
    pub fn new(queue: Arc<dyn QueueSnapshot>) -> Self {
        Self { queue }
    }
}

impl Specification for QueueSpecification {
    fn kind(&self) -> SpecificationKind {
        SpecificationKind::QueueConflict
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        profile: &QualityProfile,
        _context: &EvaluationContext<'_>,
    ) -> Verdict {
        let entries = self.queue.current();
        let overlapping: Vec<&QueueEntry> = entries
            .iter()
            .filter(|entry| {
                entry
                    .candidate
                    .overlaps(candidate.artist_id, &candidate.album_ids)
            })
            .collect();

        let Some(first) = overlapping.first() else {
            return Verdict::Accept;
        };

        if candidate.is_multi_album() {
            return Verdict::reject(
                self.kind(),
                format!(
                    "Multi-album release overlaps a release already in queue: {}",
                    first.candidate.release.title
                ),
            );
        }

        for entry in overlapping {
            if entry.state.is_failed() {
                trace!(queued = %entry.candidate, state = %entry.state, "ignoring failed queue entry");
                continue;
            }

            if !profile.upgrade_allowed {
                return Verdict::reject(
                    self.kind(),
                    format!(
                        "Release already in queue and profile {} does not allow upgrades: {}",
                        profile.name, entry.candidate.quality
                    ),
                );
            }

            let upgrades = upgrade::is_upgrade(profile, &entry.candidate, candidate);
            trace!(queued = %entry.candidate, upgrades, "compared against queue entry");
            if !upgrades {
                return Verdict::reject(
                    self.kind(),
                    format!(
                        "Release already in queue with equal or better quality: {}",
                        entry.candidate.quality
                    ),
                );
            }
        }

        Verdict::Accept
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::quality::{
        FormatTag, ProfileFormatItem, ProperPolicy, QualityModel, Revision, catalog,
    };
    use crate::release::ReleaseInfo;

    const ARTIST: i64 = 1;
    const OTHER_ARTIST: i64 = 2;
    const ALBUM: i64 = 1;
    const OTHER_ALBUM: i64 = 2;

    fn release(artist_id: i64, album_ids: Vec<i64>, quality: QualityModel) -> Candidate {
        Candidate {
            artist_id,
            album_ids,
            quality,
            formats: Vec::new(),
            release: ReleaseInfo {
                title: "Artist - Album".to_string(),
                ..ReleaseInfo::default()
            },
        }
    }

    fn quality(id: i32) -> QualityModel {
        QualityModel::new(catalog::get(id))
    }

    fn subject() -> Candidate {
        release(ARTIST, vec![ALBUM], quality(catalog::MP3_256))
    }

    fn profile(cutoff: i32) -> QualityProfile {
        catalog::default_profile(cutoff)
    }

    fn evaluate(queue: Vec<QueueEntry>, candidate: &Candidate, profile: &QualityProfile) -> Verdict {
        QueueSpecification::new(Arc::new(SharedQueue::new(queue))).evaluate(
            candidate,
            profile,
            &EvaluationContext::default(),
        )
    }

    fn queued(candidate: Candidate) -> QueueEntry {
        QueueEntry::new(candidate, TrackedDownloadState::Downloading)
    }

    #[test]
    fn test_empty_queue_accepts() {
        assert!(evaluate(Vec::new(), &subject(), &profile(catalog::FLAC)).is_accepted());
    }

    #[test]
    fn test_other_artist_accepts() {
        let queue = vec![queued(release(OTHER_ARTIST, vec![ALBUM], quality(catalog::MP3_256)))];
        assert!(evaluate(queue, &subject(), &profile(catalog::FLAC)).is_accepted());
    }

    #[test]
    fn test_other_album_accepts() {
        let queue = vec![queued(release(ARTIST, vec![OTHER_ALBUM], quality(catalog::MP3_192)))];
        assert!(evaluate(queue, &subject(), &profile(catalog::FLAC)).is_accepted());
    }

    #[test]
    fn test_everything_the_same_rejects() {
        let queue = vec![queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_256)))];
        let verdict = evaluate(queue, &subject(), &profile(catalog::FLAC));
        let rejection = verdict.rejection().unwrap();
        assert_eq!(rejection.specification, SpecificationKind::QueueConflict);
        assert!(rejection.reason.contains("already in queue"));
    }

    #[test]
    fn test_lower_quality_in_queue_accepts() {
        let queue = vec![queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_192)))];
        assert!(evaluate(queue, &subject(), &profile(catalog::MP3_320)).is_accepted());
    }

    #[test]
    fn test_better_quality_in_queue_rejects() {
        let queue = vec![queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_320)))];
        assert!(!evaluate(queue, &subject(), &profile(catalog::FLAC)).is_accepted());
    }

    #[test]
    fn test_same_quality_higher_format_score_accepts() {
        let mut profile = profile(catalog::FLAC);
        profile.format_items = vec![
            ProfileFormatItem {
                format: FormatTag::new(1, "My Format"),
                score: 10,
            },
            ProfileFormatItem {
                format: FormatTag::new(2, "Bad Format"),
                score: 0,
            },
        ];
        let mut candidate = subject();
        candidate.formats = vec![FormatTag::new(1, "My Format")];
        let mut in_queue = release(ARTIST, vec![ALBUM], quality(catalog::MP3_256));
        in_queue.formats = vec![FormatTag::new(2, "Bad Format")];

        assert!(evaluate(vec![queued(in_queue)], &candidate, &profile).is_accepted());
    }

    #[test]
    fn test_multi_album_in_queue_blocks_single_album() {
        let queue = vec![queued(release(
            ARTIST,
            vec![ALBUM, OTHER_ALBUM],
            quality(catalog::MP3_320),
        ))];
        assert!(!evaluate(queue, &subject(), &profile(catalog::FLAC)).is_accepted());
    }

    #[test]
    fn test_multi_album_candidate_blocked_by_any_overlap() {
        let candidate = release(ARTIST, vec![ALBUM, OTHER_ALBUM], quality(catalog::FLAC));
        let queue = vec![queued(release(ARTIST, vec![OTHER_ALBUM], quality(catalog::MP3_128)))];

        let verdict = evaluate(queue, &candidate, &profile(catalog::FLAC));
        assert!(verdict.rejection().unwrap().reason.starts_with("Multi-album release"));
    }

    #[test]
    fn test_multi_album_candidate_with_two_queued_parts_rejects() {
        let candidate = release(ARTIST, vec![ALBUM, OTHER_ALBUM], quality(catalog::MP3_256));
        let queue = vec![
            queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_320))),
            queued(release(ARTIST, vec![OTHER_ALBUM], quality(catalog::MP3_320))),
        ];
        assert!(!evaluate(queue, &candidate, &profile(catalog::FLAC)).is_accepted());
    }

    #[test]
    fn test_better_candidate_rejected_when_upgrades_disabled() {
        let mut profile = profile(catalog::FLAC);
        profile.upgrade_allowed = false;
        let candidate = release(ARTIST, vec![ALBUM], quality(catalog::FLAC));
        let queue = vec![queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_256)))];

        let verdict = evaluate(queue, &candidate, &profile);
        assert!(verdict.rejection().unwrap().reason.contains("does not allow upgrades"));
    }

    #[test]
    fn test_failed_pending_entry_does_not_block() {
        let entry = QueueEntry::new(
            release(ARTIST, vec![ALBUM], quality(catalog::MP3_008)),
            TrackedDownloadState::FailedPending,
        );
        let mut candidate = subject();
        candidate.quality = quality(catalog::MP3_008);

        assert!(evaluate(vec![entry], &candidate, &profile(catalog::FLAC)).is_accepted());
    }

    #[test]
    fn test_failed_entry_does_not_block_with_upgrades_disabled() {
        let mut profile = profile(catalog::FLAC);
        profile.upgrade_allowed = false;
        let entry = QueueEntry::new(
            release(ARTIST, vec![ALBUM], quality(catalog::MP3_256)),
            TrackedDownloadState::Failed,
        );
        assert!(evaluate(vec![entry], &subject(), &profile).is_accepted());
    }

    #[test]
    fn test_proper_in_queue_under_never_upgrade_rejects() {
        let mut profile = profile(catalog::MP3_008);
        profile.proper_policy = ProperPolicy::NeverUpgrade;
        let mut candidate = subject();
        candidate.quality =
            QualityModel::with_revision(catalog::get(catalog::MP3_008), Revision::new(2));
        let queue = vec![queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_008)))];

        assert!(!evaluate(queue, &candidate, &profile).is_accepted());
    }

    #[test]
    fn test_proper_in_queue_with_upgrades_accepts() {
        let mut candidate = subject();
        candidate.quality =
            QualityModel::with_revision(catalog::get(catalog::MP3_256), Revision::new(2));
        let queue = vec![queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_256)))];

        assert!(evaluate(queue, &candidate, &profile(catalog::FLAC)).is_accepted());
    }

    #[test]
    fn test_proper_in_queue_under_prefer_but_do_not_force_rejects() {
        let mut profile = profile(catalog::FLAC);
        profile.proper_policy = ProperPolicy::PreferButDoNotForce;
        let mut candidate = subject();
        candidate.quality =
            QualityModel::with_revision(catalog::get(catalog::MP3_320), Revision::new(2));
        let queue = vec![queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_320)))];

        let verdict = evaluate(queue, &candidate, &profile);
        assert!(verdict.rejection().unwrap().reason.contains("already in queue"));
    }

    #[test]
    fn test_higher_tier_in_queue_under_prefer_but_do_not_force_accepts() {
        let mut profile = profile(catalog::FLAC);
        profile.proper_policy = ProperPolicy::PreferButDoNotForce;
        let queue = vec![queued(release(ARTIST, vec![ALBUM], quality(catalog::MP3_192)))];

        assert!(evaluate(queue, &subject(), &profile).is_accepted());
    }

    #[test]
    fn test_shared_queue_snapshot_is_a_copy() {
        let queue = SharedQueue::default();
        queue.push(queued(subject()));
        let snapshot = queue.current();
        queue.replace(Vec::new());

        assert_eq!(snapshot.len(), 1);
        assert!(queue.current().is_empty());
    }
}
