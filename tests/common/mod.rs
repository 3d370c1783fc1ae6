//! Shared helpers for building banks table by table.

#![allow(dead_code)]

use cuebank::bank::layout;
use cuebank::model::opcode;
use cuebank::schema::columns::*;
use cuebank::schema::{SchemaCatalog, SchemaVersion};
use cuebank::tables::{ColumnTable, ColumnValue, TableSet};

pub const NULL16: u16 = 0xFFFF;

/// Every table a bank of `version` is written with, empty apart from the
/// header row.
pub fn empty_bank(name: &str, version: SchemaVersion) -> TableSet {
    let catalog = SchemaCatalog::with_builtin_ranges();
    let mut tables = TableSet::new();
    for table in layout::ENTITY_TABLES.iter().filter(|t| t.present_in(version)) {
        tables.insert(table.declare(&catalog, version));
    }
    let command_tables: Vec<&str> = if version >= SchemaVersion::SPLIT_COMMANDS {
        SPLIT_COMMAND_TABLES.to_vec()
    } else {
        vec![LEGACY_COMMAND_TABLE]
    };
    for name in command_tables {
        tables.insert(layout::command_table(name).declare(&catalog, version));
    }

    let header = tables.table_mut(HEADER_TABLE).expect("header declared");
    let row = header.add_row();
    header.set(row, VERSION, ColumnValue::U32(version.packed()));
    header.set(row, NAME, ColumnValue::Str(name.to_string()));
    tables
}

/// Append a row. Cells for columns the table does not carry are skipped.
pub fn add_row(tables: &mut TableSet, table: &str, cells: &[(&str, ColumnValue)]) -> usize {
    let table: &mut ColumnTable = tables.table_mut(table).expect("table declared");
    let row = table.add_row();
    for (column, value) in cells {
        table.set(row, column, value.clone());
    }
    row
}

pub fn u8v(value: u8) -> ColumnValue {
    ColumnValue::U8(value)
}

pub fn u16v(value: u16) -> ColumnValue {
    ColumnValue::U16(value)
}

pub fn u32v(value: u32) -> ColumnValue {
    ColumnValue::U32(value)
}

pub fn strv(value: &str) -> ColumnValue {
    ColumnValue::Str(value.to_string())
}

/// Big-endian u16 list cell.
pub fn list(values: &[u16]) -> ColumnValue {
    ColumnValue::Data(values.iter().flat_map(|v| v.to_be_bytes()).collect())
}

/// Note-on command cell pointing at one item.
pub fn note_on(item_type: u16, index: u16) -> ColumnValue {
    let mut data = opcode::NOTE_ON.to_be_bytes().to_vec();
    data.push(4);
    data.extend_from_slice(&item_type.to_be_bytes());
    data.extend_from_slice(&index.to_be_bytes());
    ColumnValue::Data(data)
}

/// Command cell with one opcode that carries no reference.
pub fn plain_command(opcode: u16, params: &[u8]) -> ColumnValue {
    let mut data = opcode.to_be_bytes().to_vec();
    data.push(params.len() as u8);
    data.extend_from_slice(params);
    ColumnValue::Data(data)
}

/// Cells that null every optional index of a sequence or synth row.
pub fn holder_defaults() -> Vec<(&'static str, ColumnValue)> {
    vec![
        (COMMAND_INDEX, u16v(NULL16)),
        (GLOBAL_AISAC_START, u16v(NULL16)),
        (NUM_GLOBAL_AISACS, u16v(0)),
        (ACTION_TRACK_START, u16v(NULL16)),
        (NUM_ACTION_TRACKS, u16v(0)),
    ]
}

pub fn track_row(event: u16, command: u16) -> Vec<(&'static str, ColumnValue)> {
    vec![
        (EVENT_INDEX, u16v(event)),
        (COMMAND_INDEX, u16v(command)),
        (GLOBAL_AISAC_START, u16v(NULL16)),
        (NUM_GLOBAL_AISACS, u16v(0)),
    ]
}

pub fn waveform_row(awb_id: u16) -> Vec<(&'static str, ColumnValue)> {
    vec![
        (MEMORY_AWB_ID, u16v(awb_id)),
        (STREAM_AWB_ID, u16v(NULL16)),
        (LEGACY_AWB_ID, u16v(awb_id)),
        (STREAMING, u8v(0)),
        (NUM_CHANNELS, u8v(2)),
        (SAMPLING_RATE, u16v(48000)),
        (NUM_SAMPLES, u32v(96000)),
    ]
}

/// Cue -> Sequence -> two Tracks, each track's event playing its own Synth
/// -> Waveform. The second track also has a track command group. Waveform
/// 0 uses audio id 3 in the memory archive.
pub fn scenario_bank(version: SchemaVersion) -> TableSet {
    let mut tables = empty_bank("scenario", version);
    let split = version >= SchemaVersion::SPLIT_COMMANDS;

    add_row(
        &mut tables,
        CUE_TABLE,
        &[
            (CUE_ID, u32v(0)),
            (REFERENCE_TYPE, u8v(3)),
            (REFERENCE_INDEX, u16v(0)),
            (LENGTH, u32v(2000)),
            (CUE_NAME, strv("scenario")),
        ],
    );

    let mut sequence = holder_defaults();
    sequence.push((NUM_TRACKS, u16v(2)));
    sequence.push((TRACK_INDEX, list(&[0, 1])));
    sequence.push((VOLUME, u16v(100)));
    add_row(&mut tables, SEQUENCE_TABLE, &sequence);

    for waveform in 0..2u16 {
        let mut synth = holder_defaults();
        synth.push((REFERENCE_ITEMS, list(&[1, waveform])));
        add_row(&mut tables, SYNTH_TABLE, &synth);
    }

    add_row(&mut tables, WAVEFORM_TABLE, &waveform_row(3));
    add_row(&mut tables, WAVEFORM_TABLE, &waveform_row(4));

    if split {
        add_row(&mut tables, TRACK_TABLE, &track_row(0, NULL16));
        add_row(&mut tables, TRACK_TABLE, &track_row(1, 0));
        add_row(&mut tables, TRACK_EVENT_TABLE, &[(COMMAND, note_on(2, 0))]);
        add_row(&mut tables, TRACK_EVENT_TABLE, &[(COMMAND, note_on(2, 1))]);
        add_row(&mut tables, TRACK_COMMAND_TABLE, &[(COMMAND, plain_command(1, &[0, 5]))]);
    } else {
        // One shared table: both events, then the track command.
        add_row(&mut tables, TRACK_TABLE, &track_row(0, NULL16));
        add_row(&mut tables, TRACK_TABLE, &track_row(1, 2));
        add_row(&mut tables, LEGACY_COMMAND_TABLE, &[(COMMAND, note_on(2, 0))]);
        add_row(&mut tables, LEGACY_COMMAND_TABLE, &[(COMMAND, note_on(2, 1))]);
        add_row(&mut tables, LEGACY_COMMAND_TABLE, &[(COMMAND, plain_command(1, &[0, 5]))]);
    }
    tables
}
