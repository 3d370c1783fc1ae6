//! Container
//!
//! The root of a bank's object graph: every collection, the command tables
//! and both audio archives. Collections are reachable generically through
//! the object-safe [`Table`] trait, keyed by [`EntityKind`].

use std::collections::BTreeSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveKind, AudioArchive, AudioRecord};
use crate::edit::{EditBatch, EditKind, EditOp};
use crate::error::{BankError, Result};
use crate::graph::copy::{self, CopyOutcome};
use crate::graph::sweeper::{self, SweepReport};
use crate::model::{
    Aisac, AutoModulation, CommandGroup, CommandTableKind, Cue, Entity, EntityId, EntityKind,
    FieldInfo, GlobalAisacReference, Graph, Record, Ref, RefShape, RefVisitor, RefVisitorMut,
    Sequence, StringValue, Synth, Track, Waveform,
};
use crate::schema::SchemaVersion;

/// Generic access to one collection.
pub trait Table {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn id_at(&self, index: usize) -> Option<EntityId>;

    fn position(&self, id: EntityId) -> Option<usize>;

    fn record_at(&self, index: usize) -> Option<Record>;

    /// Insert at `index` (clamped to the length). Returns false when the
    /// record is of another type.
    fn insert_record(&mut self, index: usize, record: Record) -> bool;

    fn remove_at(&mut self, index: usize) -> Option<Record>;

    fn visit_refs(&self, visitor: &mut dyn RefVisitor);

    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut);

    fn ids(&self) -> Vec<EntityId>;
}

impl<T: Entity> Table for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn id_at(&self, index: usize) -> Option<EntityId> {
        self.get(index).map(Entity::id)
    }

    fn position(&self, id: EntityId) -> Option<usize> {
        self.iter().position(|e| e.id() == id)
    }

    fn record_at(&self, index: usize) -> Option<Record> {
        self.get(index).cloned().map(Entity::into_record)
    }

    fn insert_record(&mut self, index: usize, record: Record) -> bool {
        match T::from_record(record) {
            Some(entity) => {
                let index = index.min(Vec::len(self));
                self.insert(index, entity);
                true
            }
            None => false,
        }
    }

    fn remove_at(&mut self, index: usize) -> Option<Record> {
        if index < Vec::len(self) {
            Some(self.remove(index).into_record())
        } else {
            None
        }
    }

    fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        for entity in self.iter() {
            entity.visit_refs(visitor);
        }
    }

    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        for entity in self.iter_mut() {
            entity.visit_refs_mut(visitor);
        }
    }

    fn ids(&self) -> Vec<EntityId> {
        self.iter().map(Entity::id).collect()
    }
}

/// Which command table layout a bank uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandLayout {
    /// One `CommandTable` shared by every holder.
    Legacy,
    /// One table per holder role.
    Split,
}

/// Command groups of a bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStore {
    pub layout: CommandLayout,
    pub shared: Vec<CommandGroup>,
    pub sequence: Vec<CommandGroup>,
    pub synth: Vec<CommandGroup>,
    pub track: Vec<CommandGroup>,
    pub track_event: Vec<CommandGroup>,
}

impl CommandStore {
    pub fn new(layout: CommandLayout) -> Self {
        Self {
            layout,
            shared: Vec::new(),
            sequence: Vec::new(),
            synth: Vec::new(),
            track: Vec::new(),
            track_event: Vec::new(),
        }
    }

    /// Table a reference of role `kind` points into under this layout.
    pub fn normalize(&self, kind: CommandTableKind) -> CommandTableKind {
        match self.layout {
            CommandLayout::Legacy => CommandTableKind::Shared,
            CommandLayout::Split => kind,
        }
    }

    /// Tables in use under this layout, in save order.
    pub fn kinds(&self) -> Vec<CommandTableKind> {
        match self.layout {
            CommandLayout::Legacy => vec![CommandTableKind::Shared],
            CommandLayout::Split => vec![
                CommandTableKind::Sequence,
                CommandTableKind::Synth,
                CommandTableKind::Track,
                CommandTableKind::TrackEvent,
            ],
        }
    }

    pub fn groups(&self, kind: CommandTableKind) -> &Vec<CommandGroup> {
        match self.normalize(kind) {
            CommandTableKind::Shared => &self.shared,
            CommandTableKind::Sequence => &self.sequence,
            CommandTableKind::Synth => &self.synth,
            CommandTableKind::Track => &self.track,
            CommandTableKind::TrackEvent => &self.track_event,
        }
    }

    pub fn groups_mut(&mut self, kind: CommandTableKind) -> &mut Vec<CommandGroup> {
        match self.normalize(kind) {
            CommandTableKind::Shared => &mut self.shared,
            CommandTableKind::Sequence => &mut self.sequence,
            CommandTableKind::Synth => &mut self.synth,
            CommandTableKind::Track => &mut self.track,
            CommandTableKind::TrackEvent => &mut self.track_event,
        }
    }
}

/// A parsed bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub version: SchemaVersion,
    pub cues: Vec<Cue>,
    pub sequences: Vec<Sequence>,
    pub synths: Vec<Synth>,
    pub waveforms: Vec<Waveform>,
    pub tracks: Vec<Track>,
    pub action_tracks: Vec<Track>,
    pub aisacs: Vec<Aisac>,
    pub global_aisac_refs: Vec<GlobalAisacReference>,
    pub graphs: Vec<Graph>,
    pub auto_modulations: Vec<AutoModulation>,
    pub commands: CommandStore,
    pub strings: Vec<StringValue>,
    pub memory_archive: AudioArchive,
    pub stream_archive: AudioArchive,
}

impl Container {
    /// Empty container for `version`. The command layout follows the
    /// version.
    pub fn new(name: impl Into<String>, version: SchemaVersion) -> Self {
        let layout = if version >= SchemaVersion::SPLIT_COMMANDS {
            CommandLayout::Split
        } else {
            CommandLayout::Legacy
        };
        Self {
            name: name.into(),
            version,
            cues: Vec::new(),
            sequences: Vec::new(),
            synths: Vec::new(),
            waveforms: Vec::new(),
            tracks: Vec::new(),
            action_tracks: Vec::new(),
            aisacs: Vec::new(),
            global_aisac_refs: Vec::new(),
            graphs: Vec::new(),
            auto_modulations: Vec::new(),
            commands: CommandStore::new(layout),
            strings: Vec::new(),
            memory_archive: AudioArchive::new(),
            stream_archive: AudioArchive::new(),
        }
    }

    /// Kind of the collection a reference of `kind` resolves against.
    pub fn normalize(&self, kind: EntityKind) -> EntityKind {
        match kind {
            EntityKind::Command(table) => EntityKind::Command(self.commands.normalize(table)),
            other => other,
        }
    }

    /// Every collection kind in this container, in visit order.
    pub fn collection_kinds(&self) -> Vec<EntityKind> {
        let mut kinds = vec![
            EntityKind::Cue,
            EntityKind::Sequence,
            EntityKind::Synth,
            EntityKind::Waveform,
            EntityKind::Track,
            EntityKind::ActionTrack,
            EntityKind::Aisac,
            EntityKind::GlobalAisacReference,
            EntityKind::Graph,
            EntityKind::AutoModulation,
        ];
        kinds.extend(self.commands.kinds().into_iter().map(EntityKind::Command));
        kinds.push(EntityKind::StringValue);
        kinds
    }

    pub fn table(&self, kind: EntityKind) -> &dyn Table {
        match kind {
            EntityKind::Cue => &self.cues,
            EntityKind::Sequence => &self.sequences,
            EntityKind::Synth => &self.synths,
            EntityKind::Waveform => &self.waveforms,
            EntityKind::Track => &self.tracks,
            EntityKind::ActionTrack => &self.action_tracks,
            EntityKind::Aisac => &self.aisacs,
            EntityKind::GlobalAisacReference => &self.global_aisac_refs,
            EntityKind::Graph => &self.graphs,
            EntityKind::AutoModulation => &self.auto_modulations,
            EntityKind::Command(table) => self.commands.groups(table),
            EntityKind::StringValue => &self.strings,
        }
    }

    pub fn table_mut(&mut self, kind: EntityKind) -> &mut dyn Table {
        match kind {
            EntityKind::Cue => &mut self.cues,
            EntityKind::Sequence => &mut self.sequences,
            EntityKind::Synth => &mut self.synths,
            EntityKind::Waveform => &mut self.waveforms,
            EntityKind::Track => &mut self.tracks,
            EntityKind::ActionTrack => &mut self.action_tracks,
            EntityKind::Aisac => &mut self.aisacs,
            EntityKind::GlobalAisacReference => &mut self.global_aisac_refs,
            EntityKind::Graph => &mut self.graphs,
            EntityKind::AutoModulation => &mut self.auto_modulations,
            EntityKind::Command(table) => self.commands.groups_mut(table),
            EntityKind::StringValue => &mut self.strings,
        }
    }

    pub fn archive(&self, kind: ArchiveKind) -> &AudioArchive {
        match kind {
            ArchiveKind::Memory => &self.memory_archive,
            ArchiveKind::Stream => &self.stream_archive,
        }
    }

    pub fn archive_mut(&mut self, kind: ArchiveKind) -> &mut AudioArchive {
        match kind {
            ArchiveKind::Memory => &mut self.memory_archive,
            ArchiveKind::Stream => &mut self.stream_archive,
        }
    }

    /// Collection holding `id`.
    pub fn kind_of(&self, id: EntityId) -> Option<EntityKind> {
        self.collection_kinds()
            .into_iter()
            .find(|&kind| self.table(kind).position(id).is_some())
    }

    pub fn record(&self, kind: EntityKind, id: EntityId) -> Option<Record> {
        let table = self.table(kind);
        table.position(id).and_then(|index| table.record_at(index))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.kind_of(id).is_some()
    }

    pub fn cue(&self, id: EntityId) -> Option<&Cue> {
        self.cues.iter().find(|c| c.id == id)
    }

    pub fn cue_by_cue_id(&self, cue_id: u32) -> Option<&Cue> {
        self.cues.iter().find(|c| c.cue_id == cue_id)
    }

    /// Total number of entities across every collection.
    pub fn entity_count(&self) -> usize {
        self.collection_kinds()
            .into_iter()
            .map(|kind| self.table(kind).len())
            .sum()
    }

    pub fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        for kind in self.collection_kinds() {
            self.table(kind).visit_refs(visitor);
        }
    }

    pub fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        for kind in self.collection_kinds() {
            self.table_mut(kind).visit_refs_mut(visitor);
        }
    }

    /// Append an entity to the `kind` collection.
    ///
    /// The entity keeps its id unless that id is nil or already present in
    /// this container, in which case a fresh one is minted.
    pub fn insert(&mut self, kind: EntityKind, mut record: Record) -> Result<(EntityId, EditBatch)> {
        if record.id() == EntityId::default() || self.contains(record.id()) {
            record.set_id(EntityId::new());
        }
        let id = record.id();
        let description = format!("Insert {} {}", record.type_name(), id);
        let snapshot = record.snapshot();

        let table = self.table_mut(kind);
        let index = table.len();
        if !table.insert_record(index, record) {
            return Err(BankError::KindMismatch { expected: kind });
        }
        debug!("Inserted {} at {} of {}", id, index, kind);

        let mut batch = EditBatch::new();
        batch.record(
            EditKind::Insert,
            description,
            EditOp::Insert {
                collection: self.normalize(kind),
                index,
                entity: snapshot,
            },
        );
        Ok((id, batch))
    }

    /// Remove an entity after clearing every reference to it.
    pub fn remove(&mut self, kind: EntityKind, id: EntityId) -> Result<EditBatch> {
        let index = self
            .table(kind)
            .position(id)
            .ok_or(BankError::EntityNotFound { id })?;

        let mut batch = self.detach(id);
        let Some(record) = self.table_mut(kind).remove_at(index) else {
            return Err(BankError::EntityNotFound { id });
        };
        batch.record(
            EditKind::Remove,
            format!("Remove {} {}", record.type_name(), id),
            EditOp::Remove {
                collection: self.normalize(kind),
                index,
                entity: record.snapshot(),
            },
        );
        info!("Removed {} {} ({} references cleared)", kind, id, batch.len() - 1);
        Ok(batch)
    }

    /// Clear `id` from every reference field. Scalars become null, list
    /// and run entries are dropped.
    pub fn detach(&mut self, id: EntityId) -> EditBatch {
        let mut detacher = Detacher {
            target: id,
            batch: EditBatch::new(),
        };
        self.visit_refs_mut(&mut detacher);
        detacher.batch
    }

    /// Lowest external cue id at or above `wanted` that no cue uses.
    pub fn free_cue_id(&self, wanted: u32) -> Option<u32> {
        let used: BTreeSet<u32> = self.cues.iter().map(|c| c.cue_id).collect();
        (wanted..=u32::MAX).find(|candidate| !used.contains(candidate))
    }

    /// Remove every unreachable entity, see [`sweeper::clean_up_tables`].
    pub fn clean_up_tables(&mut self, max_passes: usize) -> (SweepReport, EditBatch) {
        sweeper::clean_up_tables(self, max_passes)
    }

    /// Copy a cue and its closure from `source` into this container.
    pub fn copy_cue_from(&mut self, source: &Container, cue: EntityId) -> Result<CopyOutcome> {
        copy::copy_cue(self, source, cue, EditKind::CopyCue)
    }

    /// Copy a cue and its closure within this container.
    pub fn duplicate_cue(&mut self, cue: EntityId) -> Result<CopyOutcome> {
        let source = self.clone();
        copy::copy_cue(self, &source, cue, EditKind::DuplicateCue)
    }

    /// Store an audio record and append a waveform describing it.
    pub fn import_audio(
        &mut self,
        archive: ArchiveKind,
        record: AudioRecord,
    ) -> Result<(EntityId, EditBatch)> {
        let awb_id = self.archive(archive).next_free_id().ok_or_else(|| BankError::IndexOverflow {
            field: format!("{} archive", archive.as_str()),
            value: self.archive(archive).len() as u64,
            max: u64::from(u16::MAX - 1),
        })?;

        let mut waveform = Waveform::new(archive, awb_id);
        waveform.channels = record.channels;
        waveform.sample_rate = u16::try_from(record.sample_rate).map_err(|_| {
            BankError::InvalidAudio {
                reason: format!("sample rate {} does not fit a waveform", record.sample_rate),
            }
        })?;
        waveform.num_samples = record.num_samples;
        waveform.loop_flag = u8::from(record.is_looping());

        let (id, inserted) = self.insert(EntityKind::Waveform, waveform.into_record())?;
        self.archive_mut(archive).insert_at(awb_id, record.clone());

        let mut batch = EditBatch::new();
        batch.record(
            EditKind::ImportAudio,
            format!("Add audio record {} to the {} archive", awb_id, archive.as_str()),
            EditOp::AddAudioRecord {
                archive,
                id: awb_id,
                record,
            },
        );
        batch.extend(inserted);
        Ok((id, batch))
    }
}

struct Detacher {
    target: EntityId,
    batch: EditBatch,
}

impl Detacher {
    fn record(&mut self, holder: EntityId, field: FieldInfo, before: Vec<Ref>, after: Vec<Ref>) {
        let place = match field.slot {
            Some(slot) => format!("{}[{}]", field.name, slot),
            None => field.name.to_string(),
        };
        self.batch.record(
            EditKind::Detach,
            format!("Clear {} from {}.{}", self.target, holder, place),
            EditOp::SetReferences {
                holder,
                field: field.name.to_string(),
                slot: field.slot,
                before,
                after,
            },
        );
    }
}

impl RefVisitorMut for Detacher {
    fn visit(&mut self, holder: EntityId, field: FieldInfo, handle: &mut Ref) {
        if handle.as_id() == Some(self.target) {
            let before = *handle;
            *handle = Ref::Null;
            self.record(holder, field, vec![before], vec![Ref::Null]);
        }
    }

    fn visit_list(&mut self, holder: EntityId, field: FieldInfo, handles: &mut Vec<Ref>) {
        debug_assert!(field.shape != RefShape::Scalar);
        if !handles.iter().any(|h| h.as_id() == Some(self.target)) {
            return;
        }
        let before = handles.clone();
        handles.retain(|h| h.as_id() != Some(self.target));
        let after = handles.clone();
        self.record(holder, field, before, after);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReferenceItem;
    use pretty_assertions::assert_eq;

    fn sample() -> (Container, EntityId, EntityId, EntityId) {
        let mut container = Container::new("sample", SchemaVersion::CURRENT);
        let waveform = Waveform::new(ArchiveKind::Memory, 0);
        let mut synth = Synth::new();
        synth.items.push(ReferenceItem::waveform(waveform.id));
        let mut track = Track::new();
        track.command = Ref::Null;
        let mut sequence = Sequence::new();
        sequence.tracks = vec![Ref::Id(track.id), Ref::Id(track.id)];
        let cue = Cue::new(5, "jump", ReferenceItem::sequence(sequence.id));

        let ids = (sequence.id, track.id, synth.id);
        container.waveforms.push(waveform);
        container.synths.push(synth);
        container.tracks.push(track);
        container.sequences.push(sequence);
        container.cues.push(cue);
        (container, ids.0, ids.1, ids.2)
    }

    #[test]
    fn test_layout_follows_version() {
        let modern = Container::new("a", SchemaVersion::CURRENT);
        assert_eq!(modern.commands.layout, CommandLayout::Split);
        let legacy = Container::new("b", SchemaVersion::new(1, 22, 0, 0));
        assert_eq!(legacy.commands.layout, CommandLayout::Legacy);
        assert_eq!(
            legacy.normalize(EntityKind::Command(CommandTableKind::Synth)),
            EntityKind::Command(CommandTableKind::Shared)
        );
        assert_eq!(legacy.collection_kinds().len(), 12);
        assert_eq!(modern.collection_kinds().len(), 15);
    }

    #[test]
    fn test_kind_of_and_record() {
        let (container, sequence, track, _) = sample();
        assert_eq!(container.kind_of(sequence), Some(EntityKind::Sequence));
        assert_eq!(container.kind_of(track), Some(EntityKind::Track));
        assert_eq!(container.kind_of(EntityId::new()), None);
        assert!(container.record(EntityKind::Track, track).is_some());
        assert!(container.record(EntityKind::Sequence, track).is_none());
        assert_eq!(container.entity_count(), 5);
    }

    #[test]
    fn test_insert_mints_id_on_collision() {
        let (mut container, _, track, _) = sample();
        let mut copy = container.tracks[0].clone();
        copy.id = track;
        let (id, batch) = container.insert(EntityKind::Track, copy.into_record()).unwrap();
        assert_ne!(id, track);
        assert_eq!(container.tracks.len(), 2);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_insert_rejects_wrong_kind() {
        let (mut container, _, _, _) = sample();
        let result = container.insert(EntityKind::Graph, Track::new().into_record());
        assert!(matches!(result, Err(BankError::KindMismatch { .. })));
    }

    #[test]
    fn test_remove_detaches_referencers() {
        let (mut container, _, track, _) = sample();
        let batch = container.remove(EntityKind::Track, track).unwrap();

        assert!(container.tracks.is_empty());
        assert!(container.sequences[0].tracks.is_empty());
        // One SetReferences for the track list, one Remove.
        assert_eq!(batch.len(), 2);
        assert!(matches!(
            batch.iter().last().map(|e| &e.forward),
            Some(EditOp::Remove { .. })
        ));
    }

    #[test]
    fn test_remove_missing_entity() {
        let (mut container, _, _, _) = sample();
        let result = container.remove(EntityKind::Track, EntityId::new());
        assert!(matches!(result, Err(BankError::EntityNotFound { .. })));
    }

    #[test]
    fn test_detach_scalar_becomes_null() {
        let (mut container, sequence, _, _) = sample();
        let batch = container.detach(sequence);
        assert_eq!(batch.len(), 1);
        assert!(container.cues[0].item.handle.is_null());
        assert_eq!(container.cues[0].item.item_type, 3);
    }

    #[test]
    fn test_detach_repeated_item_records_each_slot() {
        let mut container = Container::new("slots", SchemaVersion::CURRENT);
        let shared = Waveform::new(ArchiveKind::Memory, 0);
        let other = Waveform::new(ArchiveKind::Memory, 1);
        let mut synth = Synth::new();
        synth.items = vec![
            ReferenceItem::waveform(shared.id),
            ReferenceItem::waveform(other.id),
            ReferenceItem::waveform(shared.id),
        ];
        let synth_id = synth.id;
        container.waveforms = vec![shared.clone(), other.clone()];
        container.synths.push(synth);

        let batch = container.remove(EntityKind::Waveform, shared.id).unwrap();
        let cleared: Vec<(EntityId, Option<usize>)> = batch
            .iter()
            .filter_map(|edit| match &edit.forward {
                EditOp::SetReferences {
                    holder,
                    field,
                    slot,
                    before,
                    after,
                } => {
                    assert_eq!(field, "items");
                    assert_eq!(before, &vec![Ref::Id(shared.id)]);
                    assert_eq!(after, &vec![Ref::Null]);
                    Some((*holder, *slot))
                }
                _ => None,
            })
            .collect();
        assert_eq!(cleared, vec![(synth_id, Some(0)), (synth_id, Some(2))]);

        let items = &container.synths[0].items;
        assert!(items[0].handle.is_null());
        assert_eq!(items[1].handle, Ref::Id(other.id));
        assert!(items[2].handle.is_null());

        // Undo restores each slot in reverse.
        let undo = batch.undo_ops();
        assert!(matches!(undo[0], EditOp::Insert { .. }));
        assert!(matches!(
            undo[1],
            EditOp::SetReferences { slot: Some(2), .. }
        ));
    }

    #[test]
    fn test_free_cue_id() {
        let (mut container, _, _, _) = sample();
        container.cues.push(Cue::new(6, "land", ReferenceItem::none()));
        assert_eq!(container.free_cue_id(5), Some(7));
        assert_eq!(container.free_cue_id(0), Some(0));
    }

    #[test]
    fn test_import_audio() {
        let (mut container, _, _, _) = sample();
        let record = AudioRecord::new(vec![1, 2, 3], 2, 48000, 100);
        let (id, batch) = container.import_audio(ArchiveKind::Stream, record).unwrap();

        let waveform = container.waveforms.iter().find(|w| w.id == id).unwrap();
        assert!(waveform.is_streaming());
        assert_eq!(waveform.stream_awb_id, 0);
        assert_eq!(waveform.channels, 2);
        assert!(container.stream_archive.contains(0));
        assert_eq!(batch.len(), 2);
    }
}
