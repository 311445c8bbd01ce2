//! Format tags matched against release attributes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A labeled classifier matched against a release.
///
/// Matching happens upstream; by the time a release reaches this crate it
/// carries the list of tags it matched. Scores are not stored on the tag:
/// each profile maps tags to its own score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatTag {
    pub id: i32,
    pub name: String,
    /// Used by the renaming engine only.
    #[serde(default)]
    pub include_when_renaming: bool,
}

impl FormatTag {
    #[must_use]
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            include_when_renaming: false,
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
