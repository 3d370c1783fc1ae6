//! Contiguous-run packer
//!
//! Action-track lists and global modulator lists are stored as a
//! (start, count) window into one shared table. The packer lays out those
//! shared tables and assigns each holder its window.
//!
//! Placement is first-fit over full sequences: a holder reuses the window of
//! an earlier holder only when the two ordered id sequences are identical.
//! A sequence that is merely a sub-slice of an earlier run is appended again.
//! This matches the layout existing banks were written with.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::error::{BankError, Result};
use crate::model::{Container, EntityId, EntityKind, FieldInfo, Ref, RefShape, RefVisitor};
use crate::schema::columns::NULL_INDEX_U16;

/// Window of one holder in a shared table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunSlot {
    pub start: u16,
    pub count: u16,
}

impl RunSlot {
    /// Encoding of an empty run.
    pub const EMPTY: RunSlot = RunSlot {
        start: NULL_INDEX_U16,
        count: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Physical order of one shared table.
#[derive(Debug, Clone, Default)]
struct RunArray {
    entries: Vec<EntityId>,
    placed: HashMap<Vec<EntityId>, u16>,
}

impl RunArray {
    fn place(&mut self, sequence: Vec<EntityId>, field: &'static str) -> Result<RunSlot> {
        if sequence.is_empty() {
            return Ok(RunSlot::EMPTY);
        }
        let count = checked_u16(sequence.len(), field)?;
        if let Some(&start) = self.placed.get(&sequence) {
            return Ok(RunSlot { start, count });
        }

        let start = checked_u16(self.entries.len(), field)?;
        checked_u16(self.entries.len() + sequence.len() - 1, field)?;
        self.entries.extend_from_slice(&sequence);
        self.placed.insert(sequence, start);
        Ok(RunSlot { start, count })
    }

    fn append_unplaced(&mut self, ids: &[EntityId], field: &'static str) -> Result<()> {
        let present: HashSet<EntityId> = self.entries.iter().copied().collect();
        for id in ids {
            if !present.contains(id) {
                checked_u16(self.entries.len(), field)?;
                self.entries.push(*id);
            }
        }
        Ok(())
    }
}

/// Largest index a 16-bit column can carry; 0xFFFF is the null sentinel.
fn checked_u16(value: usize, field: &'static str) -> Result<u16> {
    match u16::try_from(value) {
        Ok(v) if v != NULL_INDEX_U16 => Ok(v),
        _ => Err(BankError::IndexOverflow {
            field: field.to_string(),
            value: value as u64,
            max: u64::from(NULL_INDEX_U16 - 1),
        }),
    }
}

/// Result of packing: the physical order of the shared tables and every
/// holder's window.
#[derive(Debug, Clone, Default)]
pub struct PackedLayout {
    pub action_tracks: Vec<EntityId>,
    pub global_aisac_refs: Vec<EntityId>,
    pub slots: HashMap<(EntityId, &'static str), RunSlot>,
}

impl PackedLayout {
    /// Physical row order of a run-addressed table.
    pub fn physical(&self, kind: EntityKind) -> Option<&[EntityId]> {
        match kind {
            EntityKind::ActionTrack => Some(&self.action_tracks),
            EntityKind::GlobalAisacReference => Some(&self.global_aisac_refs),
            _ => None,
        }
    }

    pub fn slot(&self, holder: EntityId, field: &'static str) -> RunSlot {
        self.slots
            .get(&(holder, field))
            .copied()
            .unwrap_or(RunSlot::EMPTY)
    }

    /// Number of rows added by runs beyond one row per entity.
    pub fn duplicated_rows(&self, container: &Container) -> usize {
        (self.action_tracks.len() + self.global_aisac_refs.len())
            .saturating_sub(container.action_tracks.len() + container.global_aisac_refs.len())
    }
}

struct RunCollector {
    runs: Vec<(EntityId, FieldInfo, Vec<EntityId>)>,
    error: Option<BankError>,
}

impl RefVisitor for RunCollector {
    fn visit(&mut self, _holder: EntityId, _field: FieldInfo, _handle: &Ref) {}

    fn visit_list(&mut self, holder: EntityId, field: FieldInfo, handles: &[Ref]) {
        if field.shape != RefShape::Run || self.error.is_some() {
            return;
        }
        let mut sequence = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle {
                Ref::Id(id) => sequence.push(*id),
                Ref::Null => {}
                Ref::Offset(_) => {
                    self.error = Some(BankError::UnresolvedHandle {
                        holder,
                        field: field.name,
                    });
                    return;
                }
            }
        }
        self.runs.push((holder, field, sequence));
    }
}

/// Lay out the run-addressed tables of `container`.
///
/// Holders are processed in container visit order (sequences, synths,
/// tracks, action tracks). Entities no run points at are appended after all
/// runs, in collection order, so they keep a row.
pub fn pack(container: &Container) -> Result<PackedLayout> {
    let mut collector = RunCollector {
        runs: Vec::new(),
        error: None,
    };
    container.visit_refs(&mut collector);
    if let Some(err) = collector.error {
        return Err(err);
    }

    let known: HashMap<EntityKind, HashSet<EntityId>> = [
        EntityKind::ActionTrack,
        EntityKind::GlobalAisacReference,
    ]
    .into_iter()
    .map(|kind| (kind, container.table(kind).ids().into_iter().collect()))
    .collect();

    let mut action_tracks = RunArray::default();
    let mut global_aisac_refs = RunArray::default();
    let mut slots = HashMap::new();

    for (holder, field, sequence) in collector.runs {
        if let Some(missing) = sequence
            .iter()
            .find(|id| !known.get(&field.target).map_or(false, |ids| ids.contains(*id)))
        {
            return Err(BankError::DanglingReference {
                holder,
                field: field.name,
                target: *missing,
                kind: field.target,
            });
        }

        let array = match field.target {
            EntityKind::ActionTrack => &mut action_tracks,
            EntityKind::GlobalAisacReference => &mut global_aisac_refs,
            _ => continue,
        };
        let slot = array.place(sequence, field.name)?;
        slots.insert((holder, field.name), slot);
    }

    action_tracks.append_unplaced(&container.table(EntityKind::ActionTrack).ids(), "action_tracks")?;
    global_aisac_refs.append_unplaced(
        &container.table(EntityKind::GlobalAisacReference).ids(),
        "global_aisacs",
    )?;

    debug!(
        "Packed {} action track rows and {} global aisac rows for {} holders",
        action_tracks.entries.len(),
        global_aisac_refs.entries.len(),
        slots.len()
    );

    Ok(PackedLayout {
        action_tracks: action_tracks.entries,
        global_aisac_refs: global_aisac_refs.entries,
        slots,
    })
}
