//! Candidate releases and held library items.
//!
//! A [`Candidate`] is a parsed release offered by an indexer. Parsing and
//! format matching happen upstream; this crate only reads the result.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::quality::{FormatTag, QualityModel};

/// Transfer protocol a release is offered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadProtocol {
    #[default]
    Unknown,
    Usenet,
    Torrent,
}

impl DownloadProtocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Usenet => "usenet",
            Self::Torrent => "torrent",
        }
    }
}

impl fmt::Display for DownloadProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Indexer-reported metadata for a release.
///
/// Optional fields are absent when the indexer does not report them;
/// specifications that need them reject with a missing-metadata reason.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub title: String,
    #[serde(default)]
    pub indexer: String,
    #[serde(default)]
    pub protocol: DownloadProtocol,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Torrent seeders.
    #[serde(default)]
    pub seeders: Option<u32>,
    /// Minutes since the release was posted.
    #[serde(default)]
    pub age_minutes: Option<u64>,
    /// Release is flagged as password protected / encrypted.
    #[serde(default)]
    pub encrypted: bool,
}

/// Anything that can be ranked against a profile: a tier, a revision and the
/// matched format tags.
pub trait Graded {
    fn quality(&self) -> &QualityModel;
    fn formats(&self) -> &[FormatTag];
}

/// A release under evaluation.
///
/// A release may cover several albums of one artist (multi-part release); it
/// is admitted only if every album passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub artist_id: i64,
    pub album_ids: Vec<i64>,
    pub quality: QualityModel,
    #[serde(default)]
    pub formats: Vec<FormatTag>,
    pub release: ReleaseInfo,
}

impl Candidate {
    /// Returns true for releases covering more than one album.
    #[must_use]
    pub fn is_multi_album(&self) -> bool {
        self.album_ids.len() > 1
    }

    /// Returns true when this release targets at least one of `album_ids`.
    #[must_use]
    pub fn overlaps(&self, artist_id: i64, album_ids: &[i64]) -> bool {
        self.artist_id == artist_id && self.album_ids.iter().any(|id| album_ids.contains(id))
    }
}

impl Graded for Candidate {
    fn quality(&self) -> &QualityModel {
        &self.quality
    }

    fn formats(&self) -> &[FormatTag] {
        &self.formats
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.release.title, self.quality)
    }
}

/// An album already present in the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub artist_id: i64,
    pub album_id: i64,
    pub quality: QualityModel,
    #[serde(default)]
    pub formats: Vec<FormatTag>,
}

impl Graded for LibraryItem {
    fn quality(&self) -> &QualityModel {
        &self.quality
    }

    fn formats(&self) -> &[FormatTag] {
        &self.formats
    }
}
