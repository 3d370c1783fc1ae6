//! Container to tables.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::bank::codec::{encode_index_list, encode_items, encode_points, run_window};
use crate::bank::layout::{self, TableLayout};
use crate::error::{BankError, Result};
use crate::graph::{pack, resolve_ids, PackedLayout};
use crate::model::{
    CommandGroup, CommandLayout, CommandStore, CommandTableKind, Container, Entity, EntityId,
    EntityKind, FieldInfo, Ref, Track,
};
use crate::schema::columns::*;
use crate::schema::{ColumnKey, SchemaCatalog, SchemaVersion};
use crate::tables::{ColumnTable, ColumnValue, TableSet, ValueType};

/// Command layout a bank of `version` is written with. When the catalog
/// allows both, the container keeps the layout it has.
pub fn command_layout_for(
    catalog: &SchemaCatalog,
    version: SchemaVersion,
    current: CommandLayout,
) -> CommandLayout {
    let exists = |table: &str| {
        catalog.exists(&ColumnKey::new(table, COMMAND, ValueType::Data), version)
    };
    let split = SPLIT_COMMAND_TABLES.iter().all(|table| exists(table));
    let legacy = exists(LEGACY_COMMAND_TABLE);
    match (split, legacy) {
        (true, true) => current,
        (true, false) => CommandLayout::Split,
        _ => CommandLayout::Legacy,
    }
}

/// Move every command group into the tables of `layout`.
///
/// Going to the shared table concatenates the role tables. Going the other
/// way assigns each shared group to the roles that reference it; a group
/// referenced from a second role is cloned under a new id. Shared groups
/// nobody references are dropped.
pub fn convert_commands(container: &mut Container, layout: CommandLayout) {
    if container.commands.layout == layout {
        return;
    }
    match layout {
        CommandLayout::Legacy => {
            let old = std::mem::replace(&mut container.commands, CommandStore::new(layout));
            let shared = &mut container.commands.shared;
            shared.extend(old.sequence);
            shared.extend(old.synth);
            shared.extend(old.track);
            shared.extend(old.track_event);
        }
        CommandLayout::Split => {
            let old = std::mem::replace(&mut container.commands, CommandStore::new(layout));
            let by_id: HashMap<EntityId, CommandGroup> =
                old.shared.into_iter().map(|group| (group.id, group)).collect();
            let mut split = CommandStore::new(layout);
            let mut placed: HashMap<(EntityId, CommandTableKind), EntityId> = HashMap::new();
            let mut claimed: HashSet<EntityId> = HashSet::new();

            container.visit_refs_mut(&mut |_: EntityId, field: FieldInfo, handle: &mut Ref| {
                let EntityKind::Command(role) = field.target else {
                    return;
                };
                let Some(id) = handle.as_id() else {
                    return;
                };
                let Some(group) = by_id.get(&id) else {
                    return;
                };
                let new_id = *placed.entry((id, role)).or_insert_with(|| {
                    let mut copy = group.clone();
                    if !claimed.insert(id) {
                        copy.set_id(EntityId::new());
                    }
                    let new_id = copy.id;
                    split.groups_mut(role).push(copy);
                    new_id
                });
                *handle = Ref::Id(new_id);
            });

            let dropped = by_id.len().saturating_sub(claimed.len());
            if dropped > 0 {
                debug!("Dropped {} unreferenced shared command groups", dropped);
            }
            container.commands = split;
        }
    }
}

fn rows_of<'a, T: Entity + 'a>(
    order: &[EntityId],
    entities: &'a [T],
) -> Result<Vec<&'a T>> {
    let by_id: HashMap<EntityId, &T> = entities.iter().map(|e| (e.id(), e)).collect();
    order
        .iter()
        .map(|id| {
            by_id.get(id).copied().ok_or(BankError::EntityNotFound { id: *id })
        })
        .collect()
}

struct Writer<'a> {
    catalog: &'a SchemaCatalog,
    version: SchemaVersion,
    tables: TableSet,
}

impl Writer<'_> {
    fn table(&self, layout: &TableLayout) -> ColumnTable {
        layout.declare(self.catalog, self.version)
    }

    fn finish(&mut self, table: ColumnTable) {
        self.tables.insert(table);
    }
}

/// Write a run as its (start, count) column pair.
fn set_run(
    table: &mut ColumnTable,
    row: usize,
    handles: &[Ref],
    (holder, field): (EntityId, &'static str),
    (start, count): (&str, &str),
) -> Result<()> {
    let (first, len) = run_window(handles, holder, field)?;
    table.set(row, start, ColumnValue::U16(first));
    table.set(row, count, ColumnValue::U16(len));
    Ok(())
}

fn write_tracks(table: &mut ColumnTable, tracks: &[&Track]) -> Result<()> {
    for track in tracks {
        let row = table.add_row();
        let holder = track.id;
        table.set(row, EVENT_INDEX, ColumnValue::U16(track.event.encode(holder, "event")?));
        table.set(row, COMMAND_INDEX, ColumnValue::U16(track.command.encode(holder, "command")?));
        table.set(
            row,
            LOCAL_AISACS,
            ColumnValue::Data(encode_index_list(&track.local_aisacs, holder, "local_aisacs")?),
        );
        set_run(
            table,
            row,
            &track.global_aisacs,
            (holder, "global_aisacs"),
            (GLOBAL_AISAC_START, NUM_GLOBAL_AISACS),
        )?;

        let target = &track.target;
        let target_id = if target.is_local() {
            target.cue.encode::<u32>(holder, "target")?
        } else {
            target.external_id
        };
        table.set(row, TARGET_TYPE, ColumnValue::U8(target.target_type));
        table.set(row, TARGET_ID, ColumnValue::U32(target_id));
        table.set(row, TARGET_NAME, ColumnValue::Str(target.name.clone()));
        table.set(row, TARGET_BANK, ColumnValue::Str(target.bank.clone()));
    }
    Ok(())
}

fn write_rows(writer: &mut Writer<'_>, staged: &Container, packed: &PackedLayout) -> Result<()> {
    let version = writer.version;

    let mut header = writer.table(&layout::HEADER);
    let row = header.add_row();
    header.set(row, VERSION, ColumnValue::U32(version.packed()));
    header.set(row, NAME, ColumnValue::Str(staged.name.clone()));
    writer.finish(header);

    let mut cues = writer.table(&layout::CUES);
    for cue in &staged.cues {
        let row = cues.add_row();
        let item_type = u8::try_from(cue.item.item_type).map_err(|_| BankError::IndexOverflow {
            field: "item_type".to_string(),
            value: u64::from(cue.item.item_type),
            max: u64::from(u8::MAX),
        })?;
        cues.set(row, CUE_ID, ColumnValue::U32(cue.cue_id));
        cues.set(row, REFERENCE_TYPE, ColumnValue::U8(item_type));
        cues.set(row, REFERENCE_INDEX, ColumnValue::U16(cue.item.handle.encode(cue.id, "item")?));
        cues.set(row, LENGTH, ColumnValue::U32(cue.length));
        cues.set(row, CUE_NAME, ColumnValue::Str(cue.name.clone()));
    }
    writer.finish(cues);

    let mut sequences = writer.table(&layout::SEQUENCES);
    for sequence in &staged.sequences {
        let row = sequences.add_row();
        let holder = sequence.id;
        let num_tracks = u16::try_from(sequence.tracks.len()).map_err(|_| BankError::IndexOverflow {
            field: "tracks".to_string(),
            value: sequence.tracks.len() as u64,
            max: u64::from(u16::MAX),
        })?;
        sequences.set(row, TYPE, ColumnValue::U8(sequence.sequence_type));
        sequences.set(row, VOLUME, ColumnValue::U16(sequence.volume));
        sequences.set(row, NUM_TRACKS, ColumnValue::U16(num_tracks));
        sequences.set(
            row,
            TRACK_INDEX,
            ColumnValue::Data(encode_index_list(&sequence.tracks, holder, "tracks")?),
        );
        sequences.set(row, COMMAND_INDEX, ColumnValue::U16(sequence.command.encode(holder, "command")?));
        sequences.set(
            row,
            LOCAL_AISACS,
            ColumnValue::Data(encode_index_list(&sequence.local_aisacs, holder, "local_aisacs")?),
        );
        set_run(
            &mut sequences,
            row,
            &sequence.global_aisacs,
            (holder, "global_aisacs"),
            (GLOBAL_AISAC_START, NUM_GLOBAL_AISACS),
        )?;
        set_run(
            &mut sequences,
            row,
            &sequence.action_tracks,
            (holder, "action_tracks"),
            (ACTION_TRACK_START, NUM_ACTION_TRACKS),
        )?;
    }
    writer.finish(sequences);

    let mut synths = writer.table(&layout::SYNTHS);
    for synth in &staged.synths {
        let row = synths.add_row();
        let holder = synth.id;
        synths.set(row, TYPE, ColumnValue::U8(synth.synth_type));
        synths.set(row, VOLUME, ColumnValue::U16(synth.volume));
        synths.set(row, REFERENCE_ITEMS, ColumnValue::Data(encode_items(&synth.items, holder)?));
        synths.set(row, COMMAND_INDEX, ColumnValue::U16(synth.command.encode(holder, "command")?));
        synths.set(
            row,
            LOCAL_AISACS,
            ColumnValue::Data(encode_index_list(&synth.local_aisacs, holder, "local_aisacs")?),
        );
        set_run(
            &mut synths,
            row,
            &synth.global_aisacs,
            (holder, "global_aisacs"),
            (GLOBAL_AISAC_START, NUM_GLOBAL_AISACS),
        )?;
        set_run(
            &mut synths,
            row,
            &synth.action_tracks,
            (holder, "action_tracks"),
            (ACTION_TRACK_START, NUM_ACTION_TRACKS),
        )?;
    }
    writer.finish(synths);

    let mut tracks = writer.table(&layout::TRACKS);
    write_tracks(&mut tracks, &staged.tracks.iter().collect::<Vec<_>>())?;
    writer.finish(tracks);

    if layout::ACTION_TRACKS.present_in(version) {
        let mut action_tracks = writer.table(&layout::ACTION_TRACKS);
        write_tracks(&mut action_tracks, &rows_of(&packed.action_tracks, &staged.action_tracks)?)?;
        writer.finish(action_tracks);
    }

    let mut waveforms = writer.table(&layout::WAVEFORMS);
    for waveform in &staged.waveforms {
        let row = waveforms.add_row();
        waveforms.set(row, MEMORY_AWB_ID, ColumnValue::U16(waveform.memory_awb_id));
        waveforms.set(row, STREAM_AWB_ID, ColumnValue::U16(waveform.stream_awb_id));
        waveforms.set(row, LEGACY_AWB_ID, ColumnValue::U16(waveform.legacy_awb_id()));
        waveforms.set(row, ENCODE_TYPE, ColumnValue::U8(waveform.encode_type));
        waveforms.set(row, STREAMING, ColumnValue::U8(waveform.streaming));
        waveforms.set(row, NUM_CHANNELS, ColumnValue::U8(waveform.channels));
        waveforms.set(row, LOOP_FLAG, ColumnValue::U8(waveform.loop_flag));
        waveforms.set(row, SAMPLING_RATE, ColumnValue::U16(waveform.sample_rate));
        waveforms.set(row, NUM_SAMPLES, ColumnValue::U32(waveform.num_samples));
    }
    writer.finish(waveforms);

    let mut aisacs = writer.table(&layout::AISACS);
    for aisac in &staged.aisacs {
        let row = aisacs.add_row();
        let holder = aisac.id;
        aisacs.set(row, CONTROL_ID, ColumnValue::U16(aisac.control_id));
        aisacs.set(row, TYPE, ColumnValue::U8(aisac.aisac_type));
        aisacs.set(row, RANDOM_RANGE, ColumnValue::F32(aisac.random_range));
        aisacs.set(
            row,
            GRAPH_INDEXES,
            ColumnValue::Data(encode_index_list(&aisac.graphs, holder, "graphs")?),
        );
        aisacs.set(
            row,
            AUTO_MODULATION_INDEX,
            ColumnValue::U16(aisac.auto_modulation.encode(holder, "auto_modulation")?),
        );
    }
    writer.finish(aisacs);

    let mut globals = writer.table(&layout::GLOBAL_AISAC_REFERENCES);
    for reference in rows_of(&packed.global_aisac_refs, &staged.global_aisac_refs)? {
        let row = globals.add_row();
        globals.set(row, NAME, ColumnValue::Str(reference.name.clone()));
    }
    writer.finish(globals);

    let mut graphs = writer.table(&layout::GRAPHS);
    for graph in &staged.graphs {
        let row = graphs.add_row();
        graphs.set(row, TYPE, ColumnValue::U16(graph.graph_type));
        graphs.set(row, POINTS, ColumnValue::Data(encode_points(&graph.points)?));
    }
    writer.finish(graphs);

    let mut modulations = writer.table(&layout::AUTO_MODULATIONS);
    for modulation in &staged.auto_modulations {
        let row = modulations.add_row();
        modulations.set(row, TYPE, ColumnValue::U8(modulation.modulation_type));
        modulations.set(row, TRIGGER_TYPE, ColumnValue::U8(modulation.trigger_type));
        modulations.set(row, TIME, ColumnValue::U32(modulation.time));
        modulations.set(row, KEY, ColumnValue::U32(modulation.key));
    }
    writer.finish(modulations);

    let mut strings = writer.table(&layout::STRING_VALUES);
    for value in &staged.strings {
        let row = strings.add_row();
        strings.set(row, STRING_VALUE, ColumnValue::Str(value.value.clone()));
    }
    writer.finish(strings);

    for kind in staged.commands.kinds() {
        let name = match kind {
            CommandTableKind::Shared => LEGACY_COMMAND_TABLE,
            CommandTableKind::Sequence => SEQUENCE_COMMAND_TABLE,
            CommandTableKind::Synth => SYNTH_COMMAND_TABLE,
            CommandTableKind::Track => TRACK_COMMAND_TABLE,
            CommandTableKind::TrackEvent => TRACK_EVENT_TABLE,
        };
        let mut table = writer.table(&layout::command_table(name));
        for group in staged.commands.groups(kind) {
            let row = table.add_row();
            table.set(row, COMMAND, ColumnValue::Data(group.encode()?));
        }
        writer.finish(table);
    }
    Ok(())
}

/// Write `container` as a bank of `version`.
///
/// Works on a staged copy: the command layout is converted for `version`,
/// runs are packed and every handle is resolved to an offset before rows
/// are written. The container itself is not touched, and nothing is swept.
pub fn save_tables(
    container: &Container,
    catalog: &SchemaCatalog,
    version: SchemaVersion,
) -> Result<TableSet> {
    let mut staged = container.clone();
    staged.version = version;
    let layout = command_layout_for(catalog, version, staged.commands.layout);
    convert_commands(&mut staged, layout);

    let packed = pack(&staged)?;
    let duplicated = packed.duplicated_rows(&staged);
    if duplicated > 0 {
        debug!("Run packing duplicated {} rows", duplicated);
    }
    resolve_ids(&mut staged, &packed)?;

    let mut writer = Writer {
        catalog,
        version,
        tables: TableSet::new(),
    };
    write_rows(&mut writer, &staged, &packed)?;

    info!(
        "Saved bank '{}' as version {} ({} tables)",
        staged.name,
        version,
        writer.tables.len()
    );
    Ok(writer.tables)
}
