//! Tables to container.

use log::{debug, info};

use crate::bank::codec::{decode_index_list, decode_items, decode_points, expand_run, CellRef};
use crate::bank::layout;
use crate::error::{BankError, Result};
use crate::graph::resolver::{resolve_offsets, ResolveReport};
use crate::model::entities::NO_AWB_ID;
use crate::model::{
    Aisac, AutoModulation, CommandGroup, CommandLayout, CommandStore, Container, Cue, EntityId,
    GlobalAisacReference, Graph, Ref, ReferenceItem, Sequence, StringValue, Synth, Track,
    TrackTarget, Waveform,
};
use crate::schema::columns::*;
use crate::schema::{SchemaCatalog, SchemaVersion};
use crate::tables::{ColumnTable, RowView, TableAccessor, TableSet};

/// Index column as a handle. A missing column reads as null, not row 0.
fn index(row: &RowView<'_>, column: &str) -> Ref {
    if row.has(column) {
        Ref::from_raw(row.u16(column))
    } else {
        Ref::Null
    }
}

fn run(row: &RowView<'_>, start: &str, count: &str) -> Vec<Ref> {
    if !row.has(count) {
        return Vec::new();
    }
    expand_run(row.u16(start), row.u16(count))
}

fn index_list(table: &ColumnTable, row: &RowView<'_>, column: &str) -> Result<Vec<Ref>> {
    let cell = CellRef {
        table: &table.name,
        column,
        row: row.index(),
    };
    decode_index_list(&row.data(column), cell)
}

fn rows<'a>(tables: &'a TableSet, name: &str) -> Vec<RowView<'a>> {
    match tables.column_table(name) {
        Some(table) => (0..table.row_count()).map(|i| table.row(i)).collect(),
        None => Vec::new(),
    }
}

fn check_required(tables: &TableSet, version: SchemaVersion) -> Result<()> {
    for &(table, column) in REQUIRED_COLUMNS {
        let present = tables
            .column_table(table)
            .map_or(false, |t| t.column_index(column).is_some());
        if !present {
            return Err(BankError::MalformedInput {
                table: table.to_string(),
                column: column.to_string(),
                version,
            });
        }
    }
    Ok(())
}

fn detect_command_layout(tables: &TableSet) -> Result<CommandLayout> {
    if SPLIT_COMMAND_TABLES
        .iter()
        .all(|name| tables.column_table(name).is_some())
    {
        Ok(CommandLayout::Split)
    } else if tables.column_table(LEGACY_COMMAND_TABLE).is_some() {
        Ok(CommandLayout::Legacy)
    } else {
        Err(BankError::UnknownCommandTableLayout)
    }
}

fn read_cues(tables: &TableSet) -> Vec<Cue> {
    rows(tables, CUE_TABLE)
        .iter()
        .map(|row| Cue {
            id: EntityId::new(),
            cue_id: row.u32(CUE_ID),
            name: row.string(CUE_NAME),
            item: ReferenceItem {
                item_type: u16::from(row.u8(REFERENCE_TYPE)),
                handle: index(row, REFERENCE_INDEX),
            },
            length: row.u32(LENGTH),
        })
        .collect()
}

fn read_sequences(tables: &TableSet) -> Result<Vec<Sequence>> {
    let Some(table) = tables.column_table(SEQUENCE_TABLE) else {
        return Ok(Vec::new());
    };
    let mut sequences = Vec::with_capacity(table.row_count());
    for i in 0..table.row_count() {
        let row = table.row(i);
        let mut tracks = index_list(table, &row, TRACK_INDEX)?;
        let count = usize::from(row.u16(NUM_TRACKS));
        if tracks.len() < count {
            return Err(BankError::InvalidPackedData {
                table: SEQUENCE_TABLE.to_string(),
                column: TRACK_INDEX.to_string(),
                row: i,
                reason: format!("{} tracks declared, {} stored", count, tracks.len()),
            });
        }
        tracks.truncate(count);

        sequences.push(Sequence {
            id: EntityId::new(),
            sequence_type: row.u8(TYPE),
            volume: row.u16(VOLUME),
            tracks,
            command: index(&row, COMMAND_INDEX),
            local_aisacs: index_list(table, &row, LOCAL_AISACS)?,
            global_aisacs: run(&row, GLOBAL_AISAC_START, NUM_GLOBAL_AISACS),
            action_tracks: run(&row, ACTION_TRACK_START, NUM_ACTION_TRACKS),
        });
    }
    Ok(sequences)
}

fn read_synths(tables: &TableSet) -> Result<Vec<Synth>> {
    let Some(table) = tables.column_table(SYNTH_TABLE) else {
        return Ok(Vec::new());
    };
    let mut synths = Vec::with_capacity(table.row_count());
    for i in 0..table.row_count() {
        let row = table.row(i);
        let cell = CellRef {
            table: SYNTH_TABLE,
            column: REFERENCE_ITEMS,
            row: i,
        };
        synths.push(Synth {
            id: EntityId::new(),
            synth_type: row.u8(TYPE),
            volume: row.u16(VOLUME),
            items: decode_items(&row.data(REFERENCE_ITEMS), cell)?,
            command: index(&row, COMMAND_INDEX),
            local_aisacs: index_list(table, &row, LOCAL_AISACS)?,
            global_aisacs: run(&row, GLOBAL_AISAC_START, NUM_GLOBAL_AISACS),
            action_tracks: run(&row, ACTION_TRACK_START, NUM_ACTION_TRACKS),
        });
    }
    Ok(synths)
}

fn read_tracks(tables: &TableSet, name: &str) -> Result<Vec<Track>> {
    let Some(table) = tables.column_table(name) else {
        return Ok(Vec::new());
    };
    let mut tracks = Vec::with_capacity(table.row_count());
    for i in 0..table.row_count() {
        let row = table.row(i);
        let external_id = row.u32(TARGET_ID);
        let mut target = TrackTarget {
            target_type: row.u8(TARGET_TYPE),
            cue: Ref::Null,
            external_id,
            name: row.string(TARGET_NAME),
            bank: row.string(TARGET_BANK),
        };
        if target.is_local() {
            target.cue = Ref::from_raw(external_id);
        }

        tracks.push(Track {
            id: EntityId::new(),
            event: index(&row, EVENT_INDEX),
            command: index(&row, COMMAND_INDEX),
            local_aisacs: index_list(table, &row, LOCAL_AISACS)?,
            global_aisacs: run(&row, GLOBAL_AISAC_START, NUM_GLOBAL_AISACS),
            target,
        });
    }
    Ok(tracks)
}

fn read_waveforms(tables: &TableSet) -> Vec<Waveform> {
    rows(tables, WAVEFORM_TABLE)
        .iter()
        .map(|row| {
            let streaming = row.u8(STREAMING);
            let (memory_awb_id, stream_awb_id) = if row.has(MEMORY_AWB_ID) {
                (row.u16(MEMORY_AWB_ID), row.u16(STREAM_AWB_ID))
            } else {
                // One id column before the split; the flag says which archive.
                let id = row.u16(LEGACY_AWB_ID);
                if streaming == 0 {
                    (id, NO_AWB_ID)
                } else {
                    (NO_AWB_ID, id)
                }
            };
            Waveform {
                id: EntityId::new(),
                memory_awb_id,
                stream_awb_id,
                encode_type: row.u8(ENCODE_TYPE),
                streaming,
                channels: row.u8(NUM_CHANNELS),
                loop_flag: row.u8(LOOP_FLAG),
                sample_rate: row.u16(SAMPLING_RATE),
                num_samples: row.u32(NUM_SAMPLES),
            }
        })
        .collect()
}

fn read_aisacs(tables: &TableSet) -> Result<Vec<Aisac>> {
    let Some(table) = tables.column_table(AISAC_TABLE) else {
        return Ok(Vec::new());
    };
    let mut aisacs = Vec::with_capacity(table.row_count());
    for i in 0..table.row_count() {
        let row = table.row(i);
        aisacs.push(Aisac {
            id: EntityId::new(),
            control_id: row.u16(CONTROL_ID),
            aisac_type: row.u8(TYPE),
            random_range: row.f32(RANDOM_RANGE),
            graphs: index_list(table, &row, GRAPH_INDEXES)?,
            auto_modulation: index(&row, AUTO_MODULATION_INDEX),
        });
    }
    Ok(aisacs)
}

fn read_graphs(tables: &TableSet) -> Result<Vec<Graph>> {
    rows(tables, GRAPH_TABLE)
        .iter()
        .map(|row| {
            let cell = CellRef {
                table: GRAPH_TABLE,
                column: POINTS,
                row: row.index(),
            };
            Ok(Graph {
                id: EntityId::new(),
                graph_type: row.u16(TYPE),
                points: decode_points(&row.data(POINTS), cell)?,
            })
        })
        .collect()
}

fn read_commands(tables: &TableSet, name: &str) -> Result<Vec<CommandGroup>> {
    rows(tables, name)
        .iter()
        .map(|row| CommandGroup::decode(&row.data(COMMAND), name, row.index()))
        .collect()
}

/// Build a container from `tables`, with every handle resolved.
///
/// Column presence is recorded into `catalog` before any row is read.
/// Structural problems abort the load; stale offsets are reported in the
/// returned [`ResolveReport`].
pub fn load_tables(
    tables: &TableSet,
    catalog: &mut SchemaCatalog,
) -> Result<(Container, ResolveReport)> {
    let header = tables
        .column_table(HEADER_TABLE)
        .ok_or_else(|| BankError::MissingTable {
            table: HEADER_TABLE.to_string(),
        })?;
    let version = SchemaVersion::from_packed(header.value::<u32>(0, VERSION));
    check_required(tables, version)?;

    for table in layout::all_tables() {
        table.observe(tables, catalog, version);
    }

    let command_layout = detect_command_layout(tables)?;
    let mut commands = CommandStore::new(command_layout);
    match command_layout {
        CommandLayout::Legacy => commands.shared = read_commands(tables, LEGACY_COMMAND_TABLE)?,
        CommandLayout::Split => {
            commands.sequence = read_commands(tables, SEQUENCE_COMMAND_TABLE)?;
            commands.synth = read_commands(tables, SYNTH_COMMAND_TABLE)?;
            commands.track = read_commands(tables, TRACK_COMMAND_TABLE)?;
            commands.track_event = read_commands(tables, TRACK_EVENT_TABLE)?;
        }
    }
    debug!("Command layout {:?}", command_layout);

    let mut container = Container::new(header.value::<String>(0, NAME), version);
    container.commands = commands;
    container.cues = read_cues(tables);
    container.sequences = read_sequences(tables)?;
    container.synths = read_synths(tables)?;
    container.tracks = read_tracks(tables, TRACK_TABLE)?;
    container.action_tracks = read_tracks(tables, ACTION_TRACK_TABLE)?;
    container.waveforms = read_waveforms(tables);
    container.aisacs = read_aisacs(tables)?;
    container.global_aisac_refs = rows(tables, GLOBAL_AISAC_REFERENCE_TABLE)
        .iter()
        .map(|row| GlobalAisacReference {
            id: EntityId::new(),
            name: row.string(NAME),
        })
        .collect();
    container.graphs = read_graphs(tables)?;
    container.auto_modulations = rows(tables, AUTO_MODULATION_TABLE)
        .iter()
        .map(|row| AutoModulation {
            id: EntityId::new(),
            modulation_type: row.u8(TYPE),
            trigger_type: row.u8(TRIGGER_TYPE),
            time: row.u32(TIME),
            key: row.u32(KEY),
        })
        .collect();
    container.strings = rows(tables, STRING_VALUE_TABLE)
        .iter()
        .map(|row| StringValue {
            id: EntityId::new(),
            value: row.string(STRING_VALUE),
        })
        .collect();

    let report = resolve_offsets(&mut container);
    info!(
        "Loaded bank '{}' version {}: {} entities, {} stale references",
        container.name,
        version,
        container.entity_count(),
        report.unresolved.len()
    );
    Ok((container, report))
}
