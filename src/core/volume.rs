use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Set of volumes the monitor believes are attached.
pub type VolumeSet = BTreeSet<VolumeId>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VolumeIdError {
    #[error("'{0}' is not a drive identifier (expected a letter followed by ':')")]
    Malformed(String),
}

/// Normalized mount point token such as `D:`.
///
/// Only constructed through [`VolumeId::parse`], so every instance is uppercase,
/// has no trailing separator and has the drive shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeId(String);

impl VolumeId {
    /// Uppercase and strip trailing path separators.
    pub fn normalize(raw: &str) -> String {
        raw.trim_end_matches(['\\', '/']).to_uppercase()
    }

    /// Returns true if a normalized token has the drive shape: two characters, a letter then ':'.
    pub fn has_drive_shape(normalized: &str) -> bool {
        let mut chars = normalized.chars();
        matches!(
            (chars.next(), chars.next(), chars.next()),
            (Some(letter), Some(':'), None) if letter.is_ascii_alphabetic()
        )
    }

    pub fn parse(raw: &str) -> Result<Self, VolumeIdError> {
        let normalized = Self::normalize(raw);
        if Self::has_drive_shape(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(VolumeIdError::Malformed(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Root directory of the volume on the host, e.g. `D:\` on Windows.
    pub fn root(&self) -> PathBuf {
        PathBuf::from(format!("{}{}", self.0, std::path::MAIN_SEPARATOR))
    }

    /// Drive letter without the colon.
    pub fn letter(&self) -> char {
        self.0.chars().next().unwrap_or('?')
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VolumeId {
    type Err = VolumeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
