//! Failed download detection and publication.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::{
    DownloadClientItem, DownloadFailedEvent, DownloadItemStatus, EventPublisher, PublishError,
    TrackedDownload, TrackedDownloadState,
};
use crate::history::{HistoryError, HistoryEventType, HistoryLookup, HistoryRecord};

/// Message used when the client reports a failure without explanation.
pub const FAILED_DOWNLOAD_MESSAGE: &str = "Failed download detected";
/// Message used when the client reports an encrypted download.
pub const ENCRYPTED_DOWNLOAD_MESSAGE: &str = "Encrypted download detected";
/// Message used for failures declared by a user.
pub const MANUALLY_FAILED_MESSAGE: &str = "Manually marked as failed";
/// Warning attached to failed jobs with no grab history.
pub const NOT_GRABBED_WARNING: &str =
    "Download wasn't grabbed by this system, not failing download";

/// Errors raised while driving the failure state machine.
#[derive(Debug, Error)]
pub enum FailedDownloadError {
    /// The history lookup failed.
    #[error("history lookup failed: {0}")]
    History(#[from] HistoryError),

    /// The failure event could not be published; no transition happened.
    #[error("{0}\n  Suggestion: The download stays pending and is retried on the next pass")]
    Publish(#[from] PublishError),
}

impl FailedDownloadError {
    /// Returns true when the same call may succeed on a later pass: the
    /// database was busy, or the event did not go out and the download is
    /// still pending.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::History(error) => error.is_transient(),
            Self::Publish(_) => true,
        }
    }
}

/// Drives tracked downloads from detection to a published failure.
pub struct FailedDownloadService {
    history: Arc<dyn HistoryLookup>,
    publisher: Arc<dyn EventPublisher>,
}

impl FailedDownloadService {
    #[must_use]
    pub fn new(history: Arc<dyn HistoryLookup>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { history, publisher }
    }

    /// Moves a client-reported failure to `FailedPending`.
    ///
    /// Only downloads still in `Downloading` are considered. A failure for a
    /// job with no grab history is flagged with a warning and left alone.
    ///
    /// # Errors
    ///
    /// Returns [`FailedDownloadError::History`] if the history lookup fails.
    #[instrument(skip(self, tracked), fields(download_id = %tracked.download_id()))]
    pub async fn check(&self, tracked: &mut TrackedDownload) -> Result<(), FailedDownloadError> {
        if tracked.state != TrackedDownloadState::Downloading {
            return Ok(());
        }
        if !tracked.client_reports_failure() {
            return Ok(());
        }

        let grabbed = self.history.find_grabbed(tracked.download_id()).await?;
        if grabbed.is_empty() {
            warn!(title = %tracked.download_item.title, "failed download has no grab history");
            tracked.warn(NOT_GRABBED_WARNING);
            return Ok(());
        }

        tracked.state = TrackedDownloadState::FailedPending;
        info!(state = %tracked.state, "download failure detected");
        Ok(())
    }

    /// Publishes the failure of a `FailedPending` download and marks it `Failed`.
    ///
    /// The state only changes once the event is out. Vanished history is
    /// treated as a lost race and leaves the download untouched.
    ///
    /// # Errors
    ///
    /// Returns [`FailedDownloadError::History`] if the history lookup fails,
    /// or [`FailedDownloadError::Publish`] if publication fails.
    #[instrument(skip(self, tracked), fields(download_id = %tracked.download_id()))]
    pub async fn process_failed(
        &self,
        tracked: &mut TrackedDownload,
    ) -> Result<(), FailedDownloadError> {
        if tracked.state != TrackedDownloadState::FailedPending {
            return Ok(());
        }

        let grabbed = self.history.find_grabbed(tracked.download_id()).await?;
        let message = failure_message(&tracked.download_item);
        let Some(event) = build_event(&grabbed, message, false) else {
            debug!("grab history vanished, leaving download pending");
            return Ok(());
        };

        self.publisher.publish(event)?;
        tracked.state = TrackedDownloadState::Failed;
        info!(state = %tracked.state, "download marked as failed");
        Ok(())
    }

    /// Declares the grab behind a history record as failed.
    ///
    /// Every `grabbed` record sharing the record's download id is included.
    ///
    /// # Errors
    ///
    /// Returns [`FailedDownloadError::History`] if the record does not exist
    /// or a lookup fails, or [`FailedDownloadError::Publish`] if publication fails.
    #[instrument(skip(self))]
    pub async fn mark_as_failed_by_history_id(
        &self,
        history_id: i64,
        skip_redownload: bool,
    ) -> Result<(), FailedDownloadError> {
        let record = self.history.get(history_id).await?;

        let records = match record.download_id().map(ToString::to_string) {
            None => vec![record],
            Some(download_id) => {
                let mut records = Vec::new();
                if record.event_type == HistoryEventType::Grabbed {
                    records.push(record.clone());
                }
                records.extend(self.history.find_grabbed(&download_id).await?);
                if records.is_empty() {
                    records.push(record);
                }
                distinct_by_id(records)
            }
        };

        if let Some(event) = build_event(&records, MANUALLY_FAILED_MESSAGE.to_string(), skip_redownload)
        {
            self.publisher.publish(event)?;
            info!(records = records.len(), "download manually marked as failed");
        }
        Ok(())
    }

    /// Declares every grab recorded under `download_id` as failed.
    ///
    /// Returns `false` without publishing when no grab history exists.
    ///
    /// # Errors
    ///
    /// Returns [`FailedDownloadError::History`] if the lookup fails, or
    /// [`FailedDownloadError::Publish`] if publication fails.
    #[instrument(skip(self))]
    pub async fn mark_as_failed_by_download_id(
        &self,
        download_id: &str,
        skip_redownload: bool,
    ) -> Result<bool, FailedDownloadError> {
        let records = distinct_by_id(self.history.find_grabbed(download_id).await?);
        let Some(event) =
            build_event(&records, MANUALLY_FAILED_MESSAGE.to_string(), skip_redownload)
        else {
            debug!("no grab history, nothing to mark");
            return Ok(false);
        };

        self.publisher.publish(event)?;
        info!(records = records.len(), "download manually marked as failed");
        Ok(true)
    }
}

fn failure_message(item: &DownloadClientItem) -> String {
    if item.status == DownloadItemStatus::Failed {
        if let Some(message) = item.message.as_deref().filter(|m| !m.trim().is_empty()) {
            return message.to_string();
        }
    }
    if item.is_encrypted {
        ENCRYPTED_DOWNLOAD_MESSAGE.to_string()
    } else {
        FAILED_DOWNLOAD_MESSAGE.to_string()
    }
}

fn distinct_by_id(records: Vec<HistoryRecord>) -> Vec<HistoryRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.id))
        .collect()
}

/// Builds the event from history, newest first; the oldest record supplies
/// the grab details.
fn build_event(
    records: &[HistoryRecord],
    message: String,
    skip_redownload: bool,
) -> Option<DownloadFailedEvent> {
    let grab = records.last()?;
    let album_ids: BTreeSet<i64> = records.iter().map(|record| record.album_id).collect();
    let mut seen = HashSet::new();
    let history_ids = records
        .iter()
        .map(|record| record.id)
        .filter(|id| seen.insert(*id))
        .collect();

    Some(DownloadFailedEvent {
        artist_id: grab.artist_id,
        album_ids: album_ids.into_iter().collect(),
        history_ids,
        quality: grab.quality.clone(),
        source_title: grab.source_title.clone(),
        download_client: grab.download_client().map(ToString::to_string),
        download_id: grab.download_id().map(ToString::to_string),
        message,
        release_source: grab.release_source(),
        data: grab.data.clone(),
        skip_redownload,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::history::{DOWNLOAD_CLIENT, RELEASE_SOURCE, ReleaseSource};
    use crate::quality::{QualityModel, catalog};
    use crate::release::DownloadProtocol;

    #[derive(Default)]
    struct FakeHistory {
        records: Mutex<Vec<HistoryRecord>>,
    }

    impl FakeHistory {
        fn with(records: Vec<HistoryRecord>) -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(records),
            })
        }

        fn clear(&self) {
            self.records.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl HistoryLookup for FakeHistory {
        async fn get(&self, id: i64) -> crate::history::Result<HistoryRecord> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|record| record.id == id)
                .cloned()
                .ok_or(HistoryError::RecordNotFound(id))
        }

        async fn find_grabbed(
            &self,
            download_id: &str,
        ) -> crate::history::Result<Vec<HistoryRecord>> {
            let mut found: Vec<HistoryRecord> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|record| {
                    record.event_type == HistoryEventType::Grabbed
                        && record.download_id() == Some(download_id)
                })
                .cloned()
                .collect();
            found.sort_by(|a, b| b.id.cmp(&a.id));
            Ok(found)
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<DownloadFailedEvent>>,
        fail: bool,
    }

    impl RecordingPublisher {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }

        fn events(&self) -> Vec<DownloadFailedEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, event: DownloadFailedEvent) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Rejected("bus unavailable".to_string()));
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn grab(id: i64, album_id: i64, download_id: &str) -> HistoryRecord {
        HistoryRecord {
            id,
            artist_id: 3,
            album_id,
            source_title: "Artist - Album [FLAC]".to_string(),
            quality: QualityModel::new(catalog::get(catalog::FLAC)),
            event_type: HistoryEventType::Grabbed,
            download_id: Some(download_id.to_string()),
            data: HashMap::from([
                (DOWNLOAD_CLIENT.to_string(), "SABnzbd".to_string()),
                (RELEASE_SOURCE.to_string(), "rss".to_string()),
            ]),
            date: "2026-01-01 00:00:00".to_string(),
        }
    }

    fn tracked(status: DownloadItemStatus, is_encrypted: bool) -> TrackedDownload {
        TrackedDownload::new(DownloadClientItem {
            download_id: "nzo_1".to_string(),
            title: "Artist - Album [FLAC]".to_string(),
            download_client: "SABnzbd".to_string(),
            protocol: DownloadProtocol::Usenet,
            status,
            is_encrypted,
            message: None,
        })
    }

    fn service(
        history: Arc<FakeHistory>,
        publisher: Arc<RecordingPublisher>,
    ) -> FailedDownloadService {
        FailedDownloadService::new(history, publisher)
    }

    #[tokio::test]
    async fn test_check_moves_failed_download_to_pending() {
        let history = FakeHistory::with(vec![grab(1, 10, "nzo_1")]);
        let service = service(history, Arc::new(RecordingPublisher::default()));
        let mut download = tracked(DownloadItemStatus::Failed, false);

        service.check(&mut download).await.unwrap();
        assert_eq!(download.state, TrackedDownloadState::FailedPending);
    }

    #[tokio::test]
    async fn test_check_without_history_warns_and_keeps_state() {
        let service = service(
            Arc::new(FakeHistory::default()),
            Arc::new(RecordingPublisher::default()),
        );
        let mut download = tracked(DownloadItemStatus::Failed, false);

        service.check(&mut download).await.unwrap();
        assert_eq!(download.state, TrackedDownloadState::Downloading);
        assert_eq!(download.status_messages, vec![NOT_GRABBED_WARNING.to_string()]);
    }

    #[tokio::test]
    async fn test_check_ignores_healthy_and_non_downloading() {
        let history = FakeHistory::with(vec![grab(1, 10, "nzo_1")]);
        let service = service(history, Arc::new(RecordingPublisher::default()));

        let mut healthy = tracked(DownloadItemStatus::Downloading, false);
        service.check(&mut healthy).await.unwrap();
        assert_eq!(healthy.state, TrackedDownloadState::Downloading);

        let mut importing = tracked(DownloadItemStatus::Failed, false);
        importing.state = TrackedDownloadState::Importing;
        service.check(&mut importing).await.unwrap();
        assert_eq!(importing.state, TrackedDownloadState::Importing);
    }

    #[tokio::test]
    async fn test_check_treats_encrypted_as_failure() {
        let history = FakeHistory::with(vec![grab(1, 10, "nzo_1")]);
        let service = service(history, Arc::new(RecordingPublisher::default()));
        let mut download = tracked(DownloadItemStatus::Downloading, true);

        service.check(&mut download).await.unwrap();
        assert_eq!(download.state, TrackedDownloadState::FailedPending);
    }

    #[tokio::test]
    async fn test_process_failed_publishes_then_transitions() {
        let history = FakeHistory::with(vec![grab(1, 10, "nzo_1"), grab(2, 11, "nzo_1")]);
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(history, publisher.clone());
        let mut download = tracked(DownloadItemStatus::Failed, false);
        download.state = TrackedDownloadState::FailedPending;

        service.process_failed(&mut download).await.unwrap();
        assert_eq!(download.state, TrackedDownloadState::Failed);

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.artist_id, 3);
        assert_eq!(event.album_ids, vec![10, 11]);
        assert_eq!(event.history_ids, vec![2, 1]);
        assert_eq!(event.message, FAILED_DOWNLOAD_MESSAGE);
        assert_eq!(event.download_client.as_deref(), Some("SABnzbd"));
        assert_eq!(event.download_id.as_deref(), Some("nzo_1"));
        assert_eq!(event.release_source, ReleaseSource::Rss);
        assert!(!event.skip_redownload);
    }

    #[tokio::test]
    async fn test_process_failed_with_vanished_history_is_noop() {
        let history = FakeHistory::with(vec![grab(1, 10, "nzo_1")]);
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(history.clone(), publisher.clone());
        let mut download = tracked(DownloadItemStatus::Failed, false);

        service.check(&mut download).await.unwrap();
        history.clear();
        service.process_failed(&mut download).await.unwrap();

        assert_eq!(download.state, TrackedDownloadState::FailedPending);
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_process_failed_ignores_other_states() {
        let history = FakeHistory::with(vec![grab(1, 10, "nzo_1")]);
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(history, publisher.clone());
        let mut download = tracked(DownloadItemStatus::Failed, false);

        service.process_failed(&mut download).await.unwrap();
        assert_eq!(download.state, TrackedDownloadState::Downloading);
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_download_pending() {
        let history = FakeHistory::with(vec![grab(1, 10, "nzo_1")]);
        let service = service(history, RecordingPublisher::failing());
        let mut download = tracked(DownloadItemStatus::Failed, false);
        download.state = TrackedDownloadState::FailedPending;

        let err = service.process_failed(&mut download).await.unwrap_err();
        assert!(matches!(err, FailedDownloadError::Publish(_)));
        assert_eq!(download.state, TrackedDownloadState::FailedPending);
    }

    #[test]
    fn test_failure_message_priority() {
        let mut item = tracked(DownloadItemStatus::Failed, true).download_item;
        item.message = Some("Unpacking failed".to_string());
        assert_eq!(failure_message(&item), "Unpacking failed");

        item.message = Some("   ".to_string());
        assert_eq!(failure_message(&item), ENCRYPTED_DOWNLOAD_MESSAGE);

        item.is_encrypted = false;
        assert_eq!(failure_message(&item), FAILED_DOWNLOAD_MESSAGE);

        item.status = DownloadItemStatus::Downloading;
        item.is_encrypted = true;
        item.message = Some("ignored unless failed".to_string());
        assert_eq!(failure_message(&item), ENCRYPTED_DOWNLOAD_MESSAGE);
    }

    #[tokio::test]
    async fn test_mark_by_history_id_dedupes_records() {
        let history = FakeHistory::with(vec![grab(1, 10, "nzo_1"), grab(2, 11, "nzo_1")]);
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(history, publisher.clone());

        service.mark_as_failed_by_history_id(1, true).await.unwrap();

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        let mut ids = events[0].history_ids.clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(events[0].album_ids, vec![10, 11]);
        assert_eq!(events[0].message, MANUALLY_FAILED_MESSAGE);
        assert!(events[0].skip_redownload);
    }

    #[tokio::test]
    async fn test_mark_by_history_id_without_download_id_uses_record() {
        let mut record = grab(5, 20, "nzo_1");
        record.download_id = None;
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(FakeHistory::with(vec![record]), publisher.clone());

        service.mark_as_failed_by_history_id(5, false).await.unwrap();

        let events = publisher.events();
        assert_eq!(events[0].history_ids, vec![5]);
        assert_eq!(events[0].download_id, None);
        assert!(!events[0].skip_redownload);
    }

    #[tokio::test]
    async fn test_mark_by_history_id_missing_record_errors() {
        let service = service(
            Arc::new(FakeHistory::default()),
            Arc::new(RecordingPublisher::default()),
        );
        let err = service.mark_as_failed_by_history_id(42, false).await.unwrap_err();
        assert!(matches!(
            err,
            FailedDownloadError::History(HistoryError::RecordNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_mark_by_download_id_without_history_is_noop() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(Arc::new(FakeHistory::default()), publisher.clone());

        assert!(!service.mark_as_failed_by_download_id("nzo_9", false).await.unwrap());
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_mark_by_download_id_three_records_two_distinct() {
        let history = FakeHistory::with(vec![
            grab(1, 10, "nzo_1"),
            grab(2, 11, "nzo_1"),
            grab(2, 11, "nzo_1"),
        ]);
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(history, publisher.clone());

        assert!(service.mark_as_failed_by_download_id("nzo_1", false).await.unwrap());

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].history_ids.len(), 2);
        assert_eq!(events[0].album_ids, vec![10, 11]);
        assert_eq!(events[0].message, MANUALLY_FAILED_MESSAGE);
    }

    #[test]
    fn test_retryable_errors() {
        let busy = FailedDownloadError::History(HistoryError::Database {
            message: "database is locked".to_string(),
            transient: true,
        });
        assert!(busy.is_retryable());
        assert!(!FailedDownloadError::History(HistoryError::RecordNotFound(1)).is_retryable());
        let publish = FailedDownloadError::Publish(PublishError::Rejected("down".to_string()));
        assert!(publish.is_retryable());
    }

    #[test]
    fn test_build_event_three_records_two_distinct() {
        let records = vec![grab(2, 11, "nzo_1"), grab(1, 10, "nzo_1"), grab(2, 11, "nzo_1")];
        let event = build_event(
            &distinct_by_id(records),
            MANUALLY_FAILED_MESSAGE.to_string(),
            true,
        )
        .unwrap();

        assert_eq!(event.history_ids, vec![2, 1]);
        assert_eq!(event.album_ids, vec![10, 11]);
        assert!(event.skip_redownload);
    }

    #[test]
    fn test_build_event_empty_is_none() {
        assert!(build_event(&[], FAILED_DOWNLOAD_MESSAGE.to_string(), false).is_none());
    }
}
