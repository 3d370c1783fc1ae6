//! Packed bank schema versions.
//!
//! Versions are stored on disk as one big-endian u32 holding
//! major.minor.build.revision, one byte each. Comparing the packed value
//! numerically gives the usual component-wise ordering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BankError;

/// A packed major.minor.build.revision schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// Version written by default when nothing else is known.
    pub const CURRENT: SchemaVersion = SchemaVersion::new(1, 30, 0, 0);

    /// Cue names moved into the cue table.
    pub const CUE_NAMES: SchemaVersion = SchemaVersion::new(1, 10, 0, 0);

    /// Waveforms carry separate memory and stream archive ids.
    pub const SPLIT_WAVEFORM_IDS: SchemaVersion = SchemaVersion::new(1, 25, 0, 0);

    /// Sequences and synths carry action-track runs.
    pub const ACTION_TRACKS: SchemaVersion = SchemaVersion::new(1, 28, 0, 0);

    /// The single command table was split in four.
    pub const SPLIT_COMMANDS: SchemaVersion = SchemaVersion::new(1, 29, 0, 0);

    pub const fn new(major: u8, minor: u8, build: u8, revision: u8) -> Self {
        Self(u32::from_be_bytes([major, minor, build, revision]))
    }

    pub const fn from_packed(packed: u32) -> Self {
        Self(packed)
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn packed(self) -> u32 {
        self.0
    }

    pub fn major(self) -> u8 {
        self.to_be_bytes()[0]
    }

    pub fn minor(self) -> u8 {
        self.to_be_bytes()[1]
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, build, revision] = self.to_be_bytes();
        write!(f, "{}.{}.{}.{}", major, minor, build, revision)
    }
}

impl FromStr for SchemaVersion {
    type Err = BankError;

    /// Parses "1.30", "1.30.0" or "1.30.0.0". Missing components are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BankError::InvalidSchemaVersion {
            version: s.to_string(),
        };

        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 4];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            *slot = part.parse::<u8>().map_err(|_| invalid())?;
        }

        Ok(Self::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1.30.0.0", 1, 30, 0, 0)]
    #[test_case("1.6", 1, 6, 0, 0)]
    #[test_case("2.0.1", 2, 0, 1, 0)]
    fn test_parse(input: &str, major: u8, minor: u8, build: u8, revision: u8) {
        let version: SchemaVersion = input.parse().unwrap();
        assert_eq!(version, SchemaVersion::new(major, minor, build, revision));
    }

    #[test_case("1")]
    #[test_case("1.2.3.4.5")]
    #[test_case("1.x")]
    #[test_case("1.300")]
    fn test_parse_invalid(input: &str) {
        assert!(input.parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_ordering_matches_components() {
        let older = SchemaVersion::new(1, 9, 255, 255);
        let newer = SchemaVersion::new(1, 10, 0, 0);
        assert!(older < newer);
        assert!(SchemaVersion::new(2, 0, 0, 0) > SchemaVersion::new(1, 255, 0, 0));
    }

    #[test]
    fn test_packed_is_big_endian() {
        let version = SchemaVersion::new(1, 30, 0, 0);
        assert_eq!(version.packed(), 0x011E_0000);
        assert_eq!(version.to_be_bytes(), [1, 30, 0, 0]);
        assert_eq!(SchemaVersion::from_be_bytes([1, 30, 0, 0]), version);
        assert_eq!(version.to_string(), "1.30.0.0");
    }
}
