//! Schema catalog: which columns exist in which bank versions.
//!
//! Banks ship in many schema versions that differ in which columns are
//! present. The catalog learns this from observation while loading and
//! answers `exists` when reading or writing a column for a given version.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{BankError, Result};
use crate::schema::columns;
use crate::schema::SchemaVersion;
use crate::tables::ValueType;

/// Identifies one column of one table with one value type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    pub table: String,
    pub column: String,
    pub value_type: ValueType,
}

impl ColumnKey {
    pub fn new(table: &str, column: &str, value_type: ValueType) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value_type,
        }
    }
}

/// Known version range of a single column.
///
/// `observed` is the primary interval where the column was seen.
/// `absent_below` and `absent_above` are the nearest versions outside it
/// where the column was seen missing. Before the first observation,
/// `unanchored` holds the span of versions seen missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRange {
    observed: Option<(SchemaVersion, SchemaVersion)>,
    absent_below: Option<SchemaVersion>,
    absent_above: Option<SchemaVersion>,
    unanchored: Option<(SchemaVersion, SchemaVersion)>,
}

impl ColumnRange {
    /// Mark `version` as a version where the column exists.
    pub fn record_observed(&mut self, version: SchemaVersion) {
        let (lowest, highest) = match self.observed {
            Some((lo, hi)) => (lo.min(version), hi.max(version)),
            None => (version, version),
        };
        self.observed = Some((lowest, highest));

        // Absences seen before the column was ever observed become bounds
        // on whichever side of the new interval they fall.
        if let Some((first_absent, last_absent)) = self.unanchored.take() {
            if last_absent < lowest {
                self.absent_below = Some(last_absent);
            } else if first_absent > highest {
                self.absent_above = Some(first_absent);
            } else {
                if first_absent < lowest {
                    self.absent_below = Some(first_absent);
                }
                if last_absent > highest {
                    self.absent_above = Some(last_absent);
                }
            }
        }

        if self.absent_below.map_or(false, |below| below >= lowest) {
            self.absent_below = None;
        }
        if self.absent_above.map_or(false, |above| above <= highest) {
            self.absent_above = None;
        }
    }

    /// Mark `version` as a version where the column is missing.
    ///
    /// Returns false when this contradicts an earlier observation and was
    /// ignored.
    pub fn record_absent(&mut self, version: SchemaVersion) -> bool {
        match self.observed {
            Some((lowest, highest)) => {
                if version < lowest {
                    self.absent_below = Some(self.absent_below.map_or(version, |b| b.max(version)));
                    true
                } else if version > highest {
                    self.absent_above = Some(self.absent_above.map_or(version, |a| a.min(version)));
                    true
                } else {
                    false
                }
            }
            None => {
                self.unanchored = Some(match self.unanchored {
                    Some((first, last)) => (first.min(version), last.max(version)),
                    None => (version, version),
                });
                true
            }
        }
    }

    /// Whether the column exists in `version`.
    pub fn exists(&self, version: SchemaVersion) -> bool {
        match self.observed {
            Some((lowest, highest)) => {
                if version < lowest {
                    self.absent_below.map_or(true, |below| version > below)
                } else if version > highest {
                    self.absent_above.map_or(true, |above| version < above)
                } else {
                    true
                }
            }
            None => match self.unanchored {
                Some((first, last)) => version < first || version > last,
                None => true,
            },
        }
    }

    pub fn observed(&self) -> Option<(SchemaVersion, SchemaVersion)> {
        self.observed
    }
}

/// Per-session registry of column version ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    ranges: BTreeMap<String, ColumnRange>,
}

impl SchemaCatalog {
    /// Create an empty catalog. Every column is assumed to exist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog seeded with the known legacy column boundaries.
    pub fn with_builtin_ranges() -> Self {
        let mut catalog = Self::new();
        let pre_1_10 = SchemaVersion::new(1, 9, 0, 0);
        let pre_1_25 = SchemaVersion::new(1, 24, 0, 0);
        let pre_1_28 = SchemaVersion::new(1, 27, 0, 0);
        let pre_1_29 = SchemaVersion::new(1, 28, 0, 0);

        let cue_name = ColumnKey::new(columns::CUE_TABLE, columns::CUE_NAME, ValueType::Str);
        catalog.record_observed(&cue_name, SchemaVersion::CUE_NAMES);
        catalog.record_absent(&cue_name, pre_1_10);

        for column in [columns::MEMORY_AWB_ID, columns::STREAM_AWB_ID] {
            let key = ColumnKey::new(columns::WAVEFORM_TABLE, column, ValueType::U16);
            catalog.record_observed(&key, SchemaVersion::SPLIT_WAVEFORM_IDS);
            catalog.record_absent(&key, pre_1_25);
        }
        let legacy_id = ColumnKey::new(columns::WAVEFORM_TABLE, columns::LEGACY_AWB_ID, ValueType::U16);
        catalog.record_observed(&legacy_id, pre_1_25);
        catalog.record_absent(&legacy_id, SchemaVersion::SPLIT_WAVEFORM_IDS);

        for table in [columns::SEQUENCE_TABLE, columns::SYNTH_TABLE] {
            for column in [columns::ACTION_TRACK_START, columns::NUM_ACTION_TRACKS] {
                let key = ColumnKey::new(table, column, ValueType::U16);
                catalog.record_observed(&key, SchemaVersion::ACTION_TRACKS);
                catalog.record_absent(&key, pre_1_28);
            }
        }

        for table in columns::SPLIT_COMMAND_TABLES {
            let key = ColumnKey::new(table, columns::COMMAND, ValueType::Data);
            catalog.record_observed(&key, SchemaVersion::SPLIT_COMMANDS);
            catalog.record_absent(&key, pre_1_29);
        }
        let legacy = ColumnKey::new(columns::LEGACY_COMMAND_TABLE, columns::COMMAND, ValueType::Data);
        catalog.record_observed(&legacy, pre_1_29);
        catalog.record_absent(&legacy, SchemaVersion::SPLIT_COMMANDS);

        catalog
    }

    /// Load a catalog persisted with [`SchemaCatalog::save`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BankError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| BankError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the catalog as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| BankError::FileWriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn record_observed(&mut self, key: &ColumnKey, version: SchemaVersion) {
        self.ranges
            .entry(Self::slot(key))
            .or_default()
            .record_observed(version);
    }

    pub fn record_absent(&mut self, key: &ColumnKey, version: SchemaVersion) {
        let range = self.ranges.entry(Self::slot(key)).or_default();
        if range.record_absent(version) {
            debug!("{}.{} absent in {}", key.table, key.column, version);
        } else {
            warn!(
                "{}.{} reported absent in {} inside its observed range, ignoring",
                key.table, key.column, version
            );
        }
    }

    /// Whether the column exists for `version`. Columns never observed are
    /// assumed to exist.
    pub fn exists(&self, key: &ColumnKey, version: SchemaVersion) -> bool {
        self.ranges
            .get(&Self::slot(key))
            .map_or(true, |range| range.exists(version))
    }

    pub fn range(&self, key: &ColumnKey) -> Option<&ColumnRange> {
        self.ranges.get(&Self::slot(key))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    // JSON object keys must be strings.
    fn slot(key: &ColumnKey) -> String {
        format!("{}/{}/{}", key.table, key.column, key.value_type)
    }
}
