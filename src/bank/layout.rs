//! Column declarations of every table a bank is written with.
//!
//! The same list drives both directions: load records which of these columns
//! a bank carries into the schema catalog, save declares the ones the
//! catalog says exist for the target version.

use crate::schema::columns::*;
use crate::schema::{ColumnKey, SchemaCatalog, SchemaVersion};
use crate::tables::{ColumnTable, TableAccessor, ValueType};

/// Declared columns of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    pub name: &'static str,
    pub columns: &'static [(&'static str, ValueType)],
    /// First version that carries the table at all.
    pub since: Option<SchemaVersion>,
}

impl TableLayout {
    /// Whether a bank of `version` carries this table.
    pub fn present_in(&self, version: SchemaVersion) -> bool {
        self.since.map_or(true, |since| version >= since)
    }

    /// Empty table with the columns that exist for `version`.
    pub fn declare(&self, catalog: &SchemaCatalog, version: SchemaVersion) -> ColumnTable {
        ColumnTable::declared(self.name, self.columns, catalog, version)
    }

    /// Record which declared columns `tables` carries for this table.
    pub fn observe(
        &self,
        tables: &impl TableAccessor,
        catalog: &mut SchemaCatalog,
        version: SchemaVersion,
    ) {
        if tables.column_table(self.name).is_none() {
            return;
        }
        for &(column, value_type) in self.columns {
            let key = ColumnKey::new(self.name, column, value_type);
            if tables.column_exists(self.name, column, value_type) {
                catalog.record_observed(&key, version);
            } else {
                catalog.record_absent(&key, version);
            }
        }
    }
}

pub const HEADER: TableLayout = TableLayout {
    name: HEADER_TABLE,
    columns: &[(VERSION, ValueType::U32), (NAME, ValueType::Str)],
    since: None,
};

pub const CUES: TableLayout = TableLayout {
    name: CUE_TABLE,
    columns: &[
        (CUE_ID, ValueType::U32),
        (REFERENCE_TYPE, ValueType::U8),
        (REFERENCE_INDEX, ValueType::U16),
        (LENGTH, ValueType::U32),
        (CUE_NAME, ValueType::Str),
    ],
    since: None,
};

pub const SEQUENCES: TableLayout = TableLayout {
    name: SEQUENCE_TABLE,
    columns: &[
        (TYPE, ValueType::U8),
        (VOLUME, ValueType::U16),
        (NUM_TRACKS, ValueType::U16),
        (TRACK_INDEX, ValueType::Data),
        (COMMAND_INDEX, ValueType::U16),
        (LOCAL_AISACS, ValueType::Data),
        (GLOBAL_AISAC_START, ValueType::U16),
        (NUM_GLOBAL_AISACS, ValueType::U16),
        (ACTION_TRACK_START, ValueType::U16),
        (NUM_ACTION_TRACKS, ValueType::U16),
    ],
    since: None,
};

pub const SYNTHS: TableLayout = TableLayout {
    name: SYNTH_TABLE,
    columns: &[
        (TYPE, ValueType::U8),
        (VOLUME, ValueType::U16),
        (REFERENCE_ITEMS, ValueType::Data),
        (COMMAND_INDEX, ValueType::U16),
        (LOCAL_AISACS, ValueType::Data),
        (GLOBAL_AISAC_START, ValueType::U16),
        (NUM_GLOBAL_AISACS, ValueType::U16),
        (ACTION_TRACK_START, ValueType::U16),
        (NUM_ACTION_TRACKS, ValueType::U16),
    ],
    since: None,
};

const TRACK_COLUMNS: &[(&str, ValueType)] = &[
    (EVENT_INDEX, ValueType::U16),
    (COMMAND_INDEX, ValueType::U16),
    (LOCAL_AISACS, ValueType::Data),
    (GLOBAL_AISAC_START, ValueType::U16),
    (NUM_GLOBAL_AISACS, ValueType::U16),
    (TARGET_TYPE, ValueType::U8),
    (TARGET_ID, ValueType::U32),
    (TARGET_NAME, ValueType::Str),
    (TARGET_BANK, ValueType::Str),
];

pub const TRACKS: TableLayout = TableLayout {
    name: TRACK_TABLE,
    columns: TRACK_COLUMNS,
    since: None,
};

pub const ACTION_TRACKS: TableLayout = TableLayout {
    name: ACTION_TRACK_TABLE,
    columns: TRACK_COLUMNS,
    since: Some(SchemaVersion::ACTION_TRACKS),
};

pub const WAVEFORMS: TableLayout = TableLayout {
    name: WAVEFORM_TABLE,
    columns: &[
        (MEMORY_AWB_ID, ValueType::U16),
        (STREAM_AWB_ID, ValueType::U16),
        (LEGACY_AWB_ID, ValueType::U16),
        (ENCODE_TYPE, ValueType::U8),
        (STREAMING, ValueType::U8),
        (NUM_CHANNELS, ValueType::U8),
        (LOOP_FLAG, ValueType::U8),
        (SAMPLING_RATE, ValueType::U16),
        (NUM_SAMPLES, ValueType::U32),
    ],
    since: None,
};

pub const AISACS: TableLayout = TableLayout {
    name: AISAC_TABLE,
    columns: &[
        (CONTROL_ID, ValueType::U16),
        (TYPE, ValueType::U8),
        (RANDOM_RANGE, ValueType::F32),
        (GRAPH_INDEXES, ValueType::Data),
        (AUTO_MODULATION_INDEX, ValueType::U16),
    ],
    since: None,
};

pub const GLOBAL_AISAC_REFERENCES: TableLayout = TableLayout {
    name: GLOBAL_AISAC_REFERENCE_TABLE,
    columns: &[(NAME, ValueType::Str)],
    since: None,
};

pub const GRAPHS: TableLayout = TableLayout {
    name: GRAPH_TABLE,
    columns: &[(TYPE, ValueType::U16), (POINTS, ValueType::Data)],
    since: None,
};

pub const AUTO_MODULATIONS: TableLayout = TableLayout {
    name: AUTO_MODULATION_TABLE,
    columns: &[
        (TYPE, ValueType::U8),
        (TRIGGER_TYPE, ValueType::U8),
        (TIME, ValueType::U32),
        (KEY, ValueType::U32),
    ],
    since: None,
};

pub const STRING_VALUES: TableLayout = TableLayout {
    name: STRING_VALUE_TABLE,
    columns: &[(STRING_VALUE, ValueType::Str)],
    since: None,
};

const COMMAND_COLUMNS: &[(&str, ValueType)] = &[(COMMAND, ValueType::Data)];

/// Layout of a command table; every command table has the same shape.
pub const fn command_table(name: &'static str) -> TableLayout {
    TableLayout {
        name,
        columns: COMMAND_COLUMNS,
        since: None,
    }
}

/// Entity tables in save order. Command tables depend on the layout.
pub const ENTITY_TABLES: [TableLayout; 12] = [
    HEADER,
    CUES,
    SEQUENCES,
    SYNTHS,
    TRACKS,
    ACTION_TRACKS,
    WAVEFORMS,
    AISACS,
    GLOBAL_AISAC_REFERENCES,
    GRAPHS,
    AUTO_MODULATIONS,
    STRING_VALUES,
];

/// Every table layout, command tables of both layouts included.
pub fn all_tables() -> Vec<TableLayout> {
    let mut layouts = ENTITY_TABLES.to_vec();
    layouts.push(command_table(LEGACY_COMMAND_TABLE));
    layouts.extend(SPLIT_COMMAND_TABLES.into_iter().map(command_table));
    layouts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::TableSet;

    #[test]
    fn test_observe_records_present_and_absent() {
        let mut table = ColumnTable::new(CUE_TABLE);
        table.add_column(CUE_ID, ValueType::U32);
        table.add_column(REFERENCE_TYPE, ValueType::U8);
        table.add_column(REFERENCE_INDEX, ValueType::U16);
        let mut tables = TableSet::new();
        tables.insert(table);

        let mut catalog = SchemaCatalog::new();
        let version = SchemaVersion::new(1, 6, 0, 0);
        CUES.observe(&tables, &mut catalog, version);

        let name = ColumnKey::new(CUE_TABLE, CUE_NAME, ValueType::Str);
        assert!(!catalog.exists(&name, version));
        assert!(catalog.exists(&ColumnKey::new(CUE_TABLE, CUE_ID, ValueType::U32), version));

        // Length and CueName were both seen missing.
        let declared = CUES.declare(&catalog, version);
        assert_eq!(declared.columns().len(), 3);
    }

    #[test]
    fn test_action_track_table_since() {
        assert!(!ACTION_TRACKS.present_in(SchemaVersion::new(1, 22, 0, 0)));
        assert!(ACTION_TRACKS.present_in(SchemaVersion::CURRENT));
        assert!(CUES.present_in(SchemaVersion::new(1, 0, 0, 0)));
    }

    #[test]
    fn test_all_tables() {
        assert_eq!(all_tables().len(), 17);
    }
}
