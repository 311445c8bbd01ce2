//! Releasegate Core Library
//!
//! Decides which candidate releases are admitted for download and supervises
//! admitted downloads until they are imported or declared failed.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`quality`] - Quality tiers, revisions, format tags and profiles
//! - [`release`] - Candidate releases and held library items
//! - [`upgrade`] - Upgrade comparator and cutoff checks
//! - [`decision`] - Admission chain and its specifications
//! - [`tracking`] - Tracked download state machine and failure events
//! - [`history`] - Grab history lookup and the SQLite store
//! - [`redownload`] - Replacement searches for failed downloads
//! - [`db`] - Database connection and schema management

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod db;
pub mod decision;
pub mod history;
pub mod quality;
pub mod redownload;
pub mod release;
pub mod tracking;
pub mod upgrade;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use decision::{
    AdmissionChain, DEFAULT_SPECIFICATION_ORDER, DecisionSettings, EvaluationContext, QueueEntry,
    QueueSnapshot, Rejection, SearchKind, SharedQueue, Specification, SpecificationKind, Verdict,
    build_default_admission_chain,
};
pub use history::{
    HistoryError, HistoryEventType, HistoryLookup, HistoryRecord, ReleaseSource, SqliteHistory,
};
pub use quality::{FormatTag, ProperPolicy, Quality, QualityModel, QualityProfile, Revision};
pub use redownload::{RedownloadListener, SearchRequest, SearchTrigger, plan_redownload};
pub use release::{Candidate, DownloadProtocol, Graded, LibraryItem, ReleaseInfo};
pub use tracking::{
    ChannelPublisher, DownloadClientItem, DownloadFailedEvent, DownloadItemStatus,
    EventPublisher, FailedDownloadError, FailedDownloadService, TrackedDownload,
    TrackedDownloadState,
};
pub use upgrade::{Preference, compare, cutoff_met, cutoff_unmet};
