//! Grab history: what this system sent to download clients, and what became of it.
//!
//! The failure state machine only reads history through [`HistoryLookup`].
//! [`SqliteHistory`] is the bundled adapter; anything else that can answer
//! the two lookups (a remote service, a test fake) plugs in the same way.

mod error;
mod store;

pub use error::HistoryError;
pub use store::{NewHistoryRecord, SqliteHistory};

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::quality::QualityModel;

/// Data key holding the download client name.
pub const DOWNLOAD_CLIENT: &str = "downloadClient";
/// Data key holding the [`ReleaseSource`] of a grab.
pub const RELEASE_SOURCE: &str = "releaseSource";
/// Data key holding the indexer name.
pub const INDEXER: &str = "indexer";

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Kind of history event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    Grabbed,
    DownloadFailed,
    DownloadImported,
    DownloadIgnored,
}

impl HistoryEventType {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grabbed => "grabbed",
            Self::DownloadFailed => "download_failed",
            Self::DownloadImported => "download_imported",
            Self::DownloadIgnored => "download_ignored",
        }
    }
}

impl fmt::Display for HistoryEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HistoryEventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "grabbed" => Ok(Self::Grabbed),
            "download_failed" => Ok(Self::DownloadFailed),
            "download_imported" => Ok(Self::DownloadImported),
            "download_ignored" => Ok(Self::DownloadIgnored),
            _ => Err(format!("invalid history event type: {s}")),
        }
    }
}

/// How a grabbed release was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseSource {
    #[default]
    Unknown,
    Rss,
    Search,
    UserInvokedSearch,
    InteractiveSearch,
}

impl ReleaseSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Rss => "rss",
            Self::Search => "search",
            Self::UserInvokedSearch => "user_invoked_search",
            Self::InteractiveSearch => "interactive_search",
        }
    }

    /// Parses a stored value, falling back to `Unknown`.
    #[must_use]
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "rss" => Self::Rss,
            "search" => Self::Search,
            "user_invoked_search" => Self::UserInvokedSearch,
            "interactive_search" => Self::InteractiveSearch,
            _ => Self::Unknown,
        }
    }
}

/// One history row for one album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub artist_id: i64,
    pub album_id: i64,
    pub source_title: String,
    pub quality: QualityModel,
    pub event_type: HistoryEventType,
    pub download_id: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, String>,
    pub date: String,
}

impl HistoryRecord {
    /// Returns the download client recorded with the grab.
    #[must_use]
    pub fn download_client(&self) -> Option<&str> {
        self.data.get(DOWNLOAD_CLIENT).map(String::as_str)
    }

    /// Returns the release source recorded with the grab.
    #[must_use]
    pub fn release_source(&self) -> ReleaseSource {
        self.data
            .get(RELEASE_SOURCE)
            .map_or(ReleaseSource::Unknown, |value| ReleaseSource::parse_lossy(value))
    }

    /// Returns the download id when it is present and not blank.
    #[must_use]
    pub fn download_id(&self) -> Option<&str> {
        self.download_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Read access to grab history.
#[async_trait]
pub trait HistoryLookup: Send + Sync {
    /// Returns the record with this id.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::RecordNotFound`] when no such record exists.
    async fn get(&self, id: i64) -> Result<HistoryRecord>;

    /// Returns the `grabbed` records for a download id, newest first.
    async fn find_grabbed(&self, download_id: &str) -> Result<Vec<HistoryRecord>>;
}
