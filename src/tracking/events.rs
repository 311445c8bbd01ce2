//! Outbound failure events and the publication seam.
//!
//! The failure service does not call the redownload logic directly. It hands
//! a [`DownloadFailedEvent`] to an [`EventPublisher`]; whoever holds the other
//! end decides what to do with it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::history::ReleaseSource;
use crate::quality::QualityModel;

/// Published exactly once per confirmed download failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFailedEvent {
    pub artist_id: i64,
    /// Affected albums, deduplicated and sorted.
    pub album_ids: Vec<i64>,
    /// History records the event was built from, deduplicated.
    pub history_ids: Vec<i64>,
    pub quality: QualityModel,
    pub source_title: String,
    pub download_client: Option<String>,
    pub download_id: Option<String>,
    pub message: String,
    pub release_source: ReleaseSource,
    /// History data of the grab the event was built from.
    #[serde(default)]
    pub data: HashMap<String, String>,
    /// Set when the failure was declared manually and no replacement should be searched.
    pub skip_redownload: bool,
}

/// Publication failed; the event did not go out.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Nobody is listening on the other end anymore.
    #[error("event channel closed: {0}")]
    ChannelClosed(String),

    /// Publisher-specific failure.
    #[error("failed to publish event: {0}")]
    Rejected(String),
}

/// Outbound seam for failure events.
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the event could not be handed off.
    fn publish(&self, event: DownloadFailedEvent) -> Result<(), PublishError>;
}

/// Publishes events onto an unbounded `tokio` channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<DownloadFailedEvent>,
}

impl ChannelPublisher {
    /// Creates a publisher and the receiver its events arrive on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadFailedEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: DownloadFailedEvent) -> Result<(), PublishError> {
        let download_id = event.download_id.clone();
        self.sender
            .send(event)
            .map_err(|err| PublishError::ChannelClosed(err.0.source_title))?;
        debug!(?download_id, "published download failed event");
        Ok(())
    }
}
