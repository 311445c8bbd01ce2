//! Tracked downloads: the supervised lifecycle of an admitted grab.
//!
//! # Overview
//!
//! - [`DownloadClientItem`] - What the download client last reported for a job
//! - [`TrackedDownload`] - Mutable lifecycle record wrapping a client item
//! - [`TrackedDownloadState`] - Lifecycle position (downloading, failed, ...)
//! - [`TrackedDownloadStatus`] - Health flag carrying warning messages
//! - [`FailedDownloadService`] - Failure detection and event publication
//!
//! State transitions for one tracked download must be serialized by the
//! caller; the service takes `&mut TrackedDownload` so the borrow checker
//! enforces that within a process.

mod events;
mod failed;

pub use events::{ChannelPublisher, DownloadFailedEvent, EventPublisher, PublishError};
pub use failed::{
    ENCRYPTED_DOWNLOAD_MESSAGE, FAILED_DOWNLOAD_MESSAGE, FailedDownloadError,
    FailedDownloadService, MANUALLY_FAILED_MESSAGE, NOT_GRABBED_WARNING,
};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::release::DownloadProtocol;

/// Status reported by the download client for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadItemStatus {
    Queued,
    Paused,
    #[default]
    Downloading,
    Completed,
    Failed,
    Warning,
}

/// A job as last reported by the download client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadClientItem {
    /// Client-side job identifier, matched against grab history.
    pub download_id: String,
    pub title: String,
    #[serde(default)]
    pub download_client: String,
    #[serde(default)]
    pub protocol: DownloadProtocol,
    #[serde(default)]
    pub status: DownloadItemStatus,
    #[serde(default)]
    pub is_encrypted: bool,
    /// Client-provided explanation, typically set alongside a failed status.
    #[serde(default)]
    pub message: Option<String>,
}

/// Lifecycle position of a tracked download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedDownloadState {
    #[default]
    Downloading,
    ImportPending,
    Importing,
    Imported,
    FailedPending,
    Failed,
    Ignored,
}

impl TrackedDownloadState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::ImportPending => "import_pending",
            Self::Importing => "importing",
            Self::Imported => "imported",
            Self::FailedPending => "failed_pending",
            Self::Failed => "failed",
            Self::Ignored => "ignored",
        }
    }

    /// Returns true for confirmed failures, including those awaiting processing.
    #[must_use]
    pub fn is_failed(self) -> bool {
        matches!(self, Self::FailedPending | Self::Failed)
    }
}

impl fmt::Display for TrackedDownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health of a tracked download, independent of its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedDownloadStatus {
    #[default]
    Ok,
    Warning,
    Error,
}

/// Supervised lifecycle record for one admitted grab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedDownload {
    pub download_item: DownloadClientItem,
    #[serde(default)]
    pub state: TrackedDownloadState,
    #[serde(default)]
    pub status: TrackedDownloadStatus,
    #[serde(default)]
    pub status_messages: Vec<String>,
}

impl TrackedDownload {
    /// Starts tracking a client job in the `Downloading` state.
    #[must_use]
    pub fn new(download_item: DownloadClientItem) -> Self {
        Self {
            download_item,
            state: TrackedDownloadState::Downloading,
            status: TrackedDownloadStatus::Ok,
            status_messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn download_id(&self) -> &str {
        &self.download_item.download_id
    }

    /// Flags a non-fatal problem; the state is left unchanged.
    ///
    /// Replaces earlier messages so repeated polls do not pile up duplicates.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.status = TrackedDownloadStatus::Warning;
        self.status_messages = vec![message.into()];
    }

    /// Returns true when the client reports the job as failed or encrypted.
    #[must_use]
    pub fn client_reports_failure(&self) -> bool {
        self.download_item.is_encrypted || self.download_item.status == DownloadItemStatus::Failed
    }
}
