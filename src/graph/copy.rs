//! Cross-container copy engine
//!
//! Copies an entity and its whole reference closure from a source container
//! into a destination. Every copied entity gets a fresh id and every
//! reference inside the copied subgraph is rewritten to the new ids. Within
//! one copy operation each source entity is copied once per destination
//! table, so shared children stay shared.
//!
//! The work is staged on a clone of the destination and committed in one
//! step, so a failed copy leaves the destination untouched.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info};

use crate::archive::ArchiveKind;
use crate::edit::{EditBatch, EditKind, EditOp};
use crate::error::{BankError, Result};
use crate::model::{Container, EntityId, EntityKind, FieldInfo, Record, Ref, RefVisitor};

/// Result of a copy.
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    /// New id of the copied root.
    pub root: EntityId,
    /// External id of the copied cue, when the root is a cue.
    pub cue_id: Option<u32>,
    /// Entities created in the destination.
    pub copied: usize,
    /// Audio records copied between archives.
    pub audio_records: usize,
    pub edits: EditBatch,
}

type MemoKey = (EntityKind, EntityId);

struct Copier<'a> {
    dest: &'a Container,
    source: &'a Container,
    memo: HashMap<MemoKey, EntityId>,
    staged: Vec<(EntityKind, Record)>,
    queue: VecDeque<(EntityKind, EntityKind, EntityId)>,
}

impl<'a> Copier<'a> {
    fn new(dest: &'a Container, source: &'a Container) -> Self {
        Self {
            dest,
            source,
            memo: HashMap::new(),
            staged: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Queue a source entity unless it was already queued for the same
    /// destination table.
    fn enqueue(&mut self, kind: EntityKind, id: EntityId) -> EntityId {
        let dest_kind = self.dest.normalize(kind);
        let source_kind = self.source.normalize(kind);
        if let Some(new_id) = self.memo.get(&(dest_kind, id)) {
            return *new_id;
        }
        let new_id = EntityId::new();
        self.memo.insert((dest_kind, id), new_id);
        self.queue.push_back((dest_kind, source_kind, id));
        new_id
    }

    /// Walk the closure breadth first and stage one record per copy.
    fn walk(&mut self) -> Result<()> {
        while let Some((dest_kind, source_kind, id)) = self.queue.pop_front() {
            let mut record = self
                .source
                .record(source_kind, id)
                .ok_or(BankError::EntityNotFound { id })?;

            let mut children = Vec::new();
            let mut offset_field = None;
            record.visit_refs(&mut |holder: EntityId, field: FieldInfo, handle: &Ref| {
                match handle {
                    Ref::Id(child) => children.push((field.target, *child)),
                    Ref::Offset(_) => offset_field = Some((holder, field.name)),
                    Ref::Null => {}
                }
            });
            if let Some((holder, field)) = offset_field {
                return Err(BankError::UnresolvedHandle { holder, field });
            }
            for (kind, child) in children {
                self.enqueue(kind, child);
            }

            record.set_id(self.memo[&(dest_kind, id)]);
            self.staged.push((dest_kind, record));
        }
        Ok(())
    }

    /// Point every reference of the staged records at the new ids.
    fn rewrite(&mut self) {
        let dest = self.dest;
        let memo = &self.memo;
        for (_, record) in &mut self.staged {
            record.visit_refs_mut(&mut |_: EntityId, field: FieldInfo, handle: &mut Ref| {
                if let Some(old) = handle.as_id() {
                    if let Some(new_id) = memo.get(&(dest.normalize(field.target), old)) {
                        *handle = Ref::Id(*new_id);
                    }
                }
            });
        }
    }
}

/// Copy `id` of collection `kind` and its closure from `source` into
/// `dest`.
pub fn copy_entity(
    dest: &mut Container,
    source: &Container,
    kind: EntityKind,
    id: EntityId,
    edit_kind: EditKind,
) -> Result<CopyOutcome> {
    if source.table(kind).position(id).is_none() {
        return Err(match kind {
            EntityKind::Cue => BankError::CueNotFound { id },
            _ => BankError::EntityNotFound { id },
        });
    }

    let mut copier = Copier::new(dest, source);
    let root = copier.enqueue(kind, id);
    copier.walk()?;
    copier.rewrite();
    let staged = std::mem::take(&mut copier.staged);
    drop(copier);

    let mut target = dest.clone();
    let mut edits = EditBatch::new();
    let mut audio_records = 0;
    let mut audio_memo: HashMap<(ArchiveKind, u16), u16> = HashMap::new();
    let mut cue_id = None;
    let copied = staged.len();

    for (dest_kind, mut record) in staged {
        match &mut record {
            Record::Waveform(waveform) => {
                for (archive, old_id) in waveform.archive_ids() {
                    let new_id = match audio_memo.get(&(archive, old_id)) {
                        Some(new_id) => *new_id,
                        None => {
                            let audio = source
                                .archive(archive)
                                .get(old_id)
                                .cloned()
                                .ok_or(BankError::AudioRecordNotFound {
                                    id: old_id,
                                    archive: archive.as_str(),
                                })?;
                            let new_id = target.archive_mut(archive).add(audio.clone())?;
                            edits.record(
                                edit_kind,
                                format!(
                                    "Copy audio record {} to {} in the {} archive",
                                    old_id,
                                    new_id,
                                    archive.as_str()
                                ),
                                EditOp::AddAudioRecord {
                                    archive,
                                    id: new_id,
                                    record: audio,
                                },
                            );
                            audio_memo.insert((archive, old_id), new_id);
                            audio_records += 1;
                            new_id
                        }
                    };
                    waveform.set_archive_id(archive, new_id);
                }
            }
            Record::Cue(cue) => {
                if target.cue_by_cue_id(cue.cue_id).is_some() {
                    let wanted = cue.cue_id;
                    cue.cue_id = target.free_cue_id(wanted).ok_or(BankError::IndexOverflow {
                        field: "cue id".to_string(),
                        value: u64::from(wanted),
                        max: u64::from(u32::MAX),
                    })?;
                    debug!("Cue id {} is taken, copied cue uses {}", wanted, cue.cue_id);
                }
                if cue.id == root {
                    cue_id = Some(cue.cue_id);
                }
            }
            _ => {}
        }

        let snapshot = record.snapshot();
        let description = format!("Copy {} as {}", record.type_name(), record.id());
        let table = target.table_mut(dest_kind);
        let index = table.len();
        if !table.insert_record(index, record) {
            return Err(BankError::KindMismatch {
                expected: dest_kind,
            });
        }
        edits.record(
            edit_kind,
            description,
            EditOp::Insert {
                collection: dest_kind,
                index,
                entity: snapshot,
            },
        );
    }

    *dest = target;
    info!(
        "Copied {} entities and {} audio records from {} into {}",
        copied, audio_records, source.name, dest.name
    );
    Ok(CopyOutcome {
        root,
        cue_id,
        copied,
        audio_records,
        edits,
    })
}

/// Copy a cue and its closure.
pub fn copy_cue(
    dest: &mut Container,
    source: &Container,
    cue: EntityId,
    edit_kind: EditKind,
) -> Result<CopyOutcome> {
    copy_entity(dest, source, EntityKind::Cue, cue, edit_kind)
}

/// Ids reachable from `root`, the root included, in breadth-first order.
pub fn closure(
    container: &Container,
    kind: EntityKind,
    root: EntityId,
) -> Vec<(EntityKind, EntityId)> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([(container.normalize(kind), root)]);
    while let Some((kind, id)) = queue.pop_front() {
        if !seen.insert((kind, id)) {
            continue;
        }
        order.push((kind, id));
        if let Some(record) = container.record(kind, id) {
            record.visit_refs(&mut ClosureVisitor {
                container,
                queue: &mut queue,
            });
        }
    }
    order
}

struct ClosureVisitor<'a> {
    container: &'a Container,
    queue: &'a mut VecDeque<(EntityKind, EntityId)>,
}

impl RefVisitor for ClosureVisitor<'_> {
    fn visit(&mut self, _holder: EntityId, field: FieldInfo, handle: &Ref) {
        if let Some(id) = handle.as_id() {
            self.queue
                .push_back((self.container.normalize(field.target), id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::AudioRecord;
    use crate::model::entities::item_type;
    use crate::model::{
        opcode, Command, CommandGroup, Cue, GlobalAisacReference, ReferenceItem, Sequence,
        StringValue, Synth, Track, TrackTarget, Waveform,
    };
    use crate::schema::SchemaVersion;
    use pretty_assertions::assert_eq;

    fn source_bank() -> (Container, EntityId) {
        let mut source = Container::new("source", SchemaVersion::CURRENT);
        source
            .memory_archive
            .insert_at(3, AudioRecord::new(vec![9, 9], 1, 44100, 2));

        let waveform = Waveform::new(ArchiveKind::Memory, 3);
        let mut synth = Synth::new();
        synth.items = vec![ReferenceItem::waveform(waveform.id)];

        let label = StringValue::new("label");
        let mut params = vec![0xFF, 0xFF];
        params.extend_from_slice(&[0, 0]);
        let mut text = Command::new(opcode::STRING_VALUE, params);
        text.link = Ref::Id(label.id);
        let commands = CommandGroup::new(vec![text]);

        let mut shared_track = Track::new();
        shared_track.command = Ref::Id(commands.id);
        let global = GlobalAisacReference::new("volume");
        let mut sequence = Sequence::new();
        // The same track twice: copied once.
        sequence.tracks = vec![Ref::Id(shared_track.id), Ref::Id(shared_track.id)];
        sequence.global_aisacs = vec![Ref::Id(global.id)];
        let note = CommandGroup::new(vec![Command::note_on(item_type::SYNTH, synth.id)]);
        sequence.command = Ref::Id(note.id);

        let cue = Cue::new(7, "jump", ReferenceItem::sequence(sequence.id));
        let cue_id = cue.id;

        source.strings.push(label);
        source.commands.track.push(commands);
        source.commands.sequence.push(note);
        source.waveforms.push(waveform);
        source.synths.push(synth);
        source.tracks.push(shared_track);
        source.global_aisac_refs.push(global);
        source.sequences.push(sequence);
        source.cues.push(cue);
        (source, cue_id)
    }

    #[test]
    fn test_copy_closure_is_complete_and_fresh() {
        let (source, cue) = source_bank();
        let mut dest = Container::new("dest", SchemaVersion::CURRENT);

        let outcome = copy_cue(&mut dest, &source, cue, EditKind::CopyCue).unwrap();
        let source_closure = closure(&source, EntityKind::Cue, cue);
        let dest_closure = closure(&dest, EntityKind::Cue, outcome.root);

        assert_eq!(source_closure.len(), dest_closure.len());
        assert_eq!(outcome.copied, source_closure.len());
        assert_eq!(dest.entity_count(), source.entity_count());

        let source_ids: HashSet<EntityId> = source_closure.iter().map(|(_, id)| *id).collect();
        for (kind, id) in &dest_closure {
            assert!(!source_ids.contains(id));
            assert!(dest.record(*kind, *id).is_some());
        }
        assert_eq!(dest.tracks.len(), 1);
        assert_eq!(outcome.cue_id, Some(7));
    }

    #[test]
    fn test_copy_moves_audio_records() {
        let (source, cue) = source_bank();
        let mut dest = Container::new("dest", SchemaVersion::CURRENT);
        dest.memory_archive
            .insert_at(0, AudioRecord::new(vec![1], 1, 44100, 1));

        let outcome = copy_cue(&mut dest, &source, cue, EditKind::CopyCue).unwrap();
        assert_eq!(outcome.audio_records, 1);
        assert_eq!(dest.waveforms[0].memory_awb_id, 1);
        assert_eq!(dest.memory_archive.get(1).map(|r| r.data.clone()), Some(vec![9, 9]));
    }

    #[test]
    fn test_colliding_cue_id_is_reassigned() {
        let (source, cue) = source_bank();
        let mut dest = Container::new("dest", SchemaVersion::CURRENT);
        dest.cues.push(Cue::new(7, "existing", ReferenceItem::none()));
        dest.cues.push(Cue::new(8, "existing", ReferenceItem::none()));

        let outcome = copy_cue(&mut dest, &source, cue, EditKind::CopyCue).unwrap();
        assert_eq!(outcome.cue_id, Some(9));
        assert_eq!(dest.cue(outcome.root).map(|c| c.cue_id), Some(9));
    }

    #[test]
    fn test_failed_copy_leaves_destination_untouched() {
        let (mut source, cue) = source_bank();
        source.memory_archive.remove(3);
        let mut dest = Container::new("dest", SchemaVersion::CURRENT);
        let before = dest.clone();

        let result = copy_cue(&mut dest, &source, cue, EditKind::CopyCue);
        assert!(matches!(result, Err(BankError::AudioRecordNotFound { id: 3, .. })));
        assert_eq!(dest, before);
    }

    #[test]
    fn test_copy_into_legacy_layout_merges_command_tables() {
        let (source, cue) = source_bank();
        let mut dest = Container::new("dest", SchemaVersion::new(1, 22, 0, 0));

        copy_cue(&mut dest, &source, cue, EditKind::CopyCue).unwrap();
        assert_eq!(dest.commands.shared.len(), 2);
        assert!(dest.commands.sequence.is_empty());
    }

    #[test]
    fn test_action_track_target_cue_is_copied() {
        let mut source = Container::new("source", SchemaVersion::CURRENT);
        let target = Cue::new(1, "target", ReferenceItem::none());
        let mut action = Track::new();
        action.target = TrackTarget::local_cue(target.id);
        let mut sequence = Sequence::new();
        sequence.action_tracks = vec![Ref::Id(action.id)];
        let root = Cue::new(2, "root", ReferenceItem::sequence(sequence.id));
        let root_id = root.id;
        source.cues.extend([target, root]);
        source.action_tracks.push(action);
        source.sequences.push(sequence);

        let mut dest = Container::new("dest", SchemaVersion::CURRENT);
        let outcome = copy_cue(&mut dest, &source, root_id, EditKind::CopyCue).unwrap();
        assert_eq!(outcome.copied, 4);
        assert_eq!(dest.cues.len(), 2);
        let copied_target = dest.action_tracks[0].target.cue.as_id().unwrap();
        assert!(dest.cue(copied_target).is_some());
    }

    #[test]
    fn test_missing_cue() {
        let (source, _) = source_bank();
        let mut dest = Container::new("dest", SchemaVersion::CURRENT);
        let result = copy_cue(&mut dest, &source, EntityId::new(), EditKind::CopyCue);
        assert!(matches!(result, Err(BankError::CueNotFound { .. })));
    }
}
