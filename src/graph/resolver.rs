//! Graph resolver
//!
//! Converts reference handles between the on-disk offset form and the
//! stable id form.
//!
//! After load every handle holds a raw offset into its target collection.
//! [`resolve_offsets`] maps each one onto the id of the entity at that
//! position. Offsets past the end of the target (stale slots shipped in
//! real banks) become null and are reported, never rejected.
//!
//! Before save [`resolve_ids`] runs the other way on a staged copy, using
//! the physical order fixed by the packer for run-addressed tables.

use std::collections::HashMap;

use log::{debug, warn};

use crate::error::{BankError, Result};
use crate::graph::packer::PackedLayout;
use crate::model::{
    CommandLayout, CommandTableKind, Container, EntityId, EntityKind, FieldInfo, Ref, RefShape,
    RefVisitorMut,
};

/// A stale offset that was degraded to null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub holder: EntityId,
    pub field: &'static str,
    pub target: EntityKind,
    pub offset: u32,
}

/// Outcome of offset to id resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    /// Handles turned into stable ids.
    pub resolved: usize,
    /// Out-of-range offsets, now null.
    pub unresolved: Vec<UnresolvedReference>,
}

impl ResolveReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

fn normalize(layout: CommandLayout, kind: EntityKind) -> EntityKind {
    match (layout, kind) {
        (CommandLayout::Legacy, EntityKind::Command(_)) => EntityKind::Command(CommandTableKind::Shared),
        _ => kind,
    }
}

struct OffsetResolver {
    layout: CommandLayout,
    ids: HashMap<EntityKind, Vec<EntityId>>,
    report: ResolveReport,
}

impl OffsetResolver {
    fn resolve(&mut self, holder: EntityId, field: FieldInfo, handle: &mut Ref) {
        let Ref::Offset(offset) = *handle else {
            return;
        };
        let target = normalize(self.layout, field.target);
        match self
            .ids
            .get(&target)
            .and_then(|ids| ids.get(offset as usize))
        {
            Some(id) => {
                *handle = Ref::Id(*id);
                self.report.resolved += 1;
            }
            None => {
                warn!(
                    "Offset {} in {}.{} is outside the {} table; treating it as null",
                    offset, holder, field.name, target
                );
                *handle = Ref::Null;
                self.report.unresolved.push(UnresolvedReference {
                    holder,
                    field: field.name,
                    target,
                    offset,
                });
            }
        }
    }
}

impl RefVisitorMut for OffsetResolver {
    fn visit(&mut self, holder: EntityId, field: FieldInfo, handle: &mut Ref) {
        self.resolve(holder, field, handle);
    }

    fn visit_list(&mut self, holder: EntityId, field: FieldInfo, handles: &mut Vec<Ref>) {
        for handle in handles.iter_mut() {
            self.resolve(holder, field, handle);
        }
        if field.shape == RefShape::Run {
            handles.retain(|h| !h.is_null());
        }
    }
}

/// Resolve every offset handle of a freshly loaded container.
pub fn resolve_offsets(container: &mut Container) -> ResolveReport {
    let ids = container
        .collection_kinds()
        .into_iter()
        .map(|kind| (kind, container.table(kind).ids()))
        .collect();

    let mut resolver = OffsetResolver {
        layout: container.commands.layout,
        ids,
        report: ResolveReport::default(),
    };
    container.visit_refs_mut(&mut resolver);

    let report = resolver.report;
    debug!(
        "Resolved {} offsets ({} stale)",
        report.resolved,
        report.unresolved.len()
    );
    report
}

struct IdResolver<'a> {
    layout: CommandLayout,
    positions: HashMap<EntityKind, HashMap<EntityId, u32>>,
    packed: &'a PackedLayout,
    error: Option<BankError>,
}

impl IdResolver<'_> {
    fn resolve(&mut self, holder: EntityId, field: FieldInfo, handle: &mut Ref) {
        if self.error.is_some() {
            return;
        }
        match *handle {
            Ref::Null => {}
            Ref::Offset(_) => {
                self.error = Some(BankError::UnresolvedHandle {
                    holder,
                    field: field.name,
                });
            }
            Ref::Id(id) => {
                let target = normalize(self.layout, field.target);
                match self.positions.get(&target).and_then(|p| p.get(&id)) {
                    Some(position) => *handle = Ref::Offset(*position),
                    None => {
                        self.error = Some(BankError::DanglingReference {
                            holder,
                            field: field.name,
                            target: id,
                            kind: target,
                        });
                    }
                }
            }
        }
    }
}

impl RefVisitorMut for IdResolver<'_> {
    fn visit(&mut self, holder: EntityId, field: FieldInfo, handle: &mut Ref) {
        self.resolve(holder, field, handle);
    }

    fn visit_list(&mut self, holder: EntityId, field: FieldInfo, handles: &mut Vec<Ref>) {
        if field.shape != RefShape::Run {
            for handle in handles.iter_mut() {
                self.resolve(holder, field, handle);
            }
            return;
        }
        if self.error.is_some() {
            return;
        }
        let slot = self.packed.slot(holder, field.name);
        let start = u32::from(slot.start);
        *handles = (0..u32::from(slot.count))
            .map(|i| Ref::Offset(start + i))
            .collect();
    }
}

/// Replace every stable id handle with the target's current offset.
///
/// Run-shaped fields take their window from `packed`; scalar and list
/// handles pointing into run-addressed tables use the first physical row of
/// their target. A handle whose id is no longer in its target collection is
/// an invariant violation and aborts the save.
pub fn resolve_ids(container: &mut Container, packed: &PackedLayout) -> Result<()> {
    let mut positions: HashMap<EntityKind, HashMap<EntityId, u32>> = HashMap::new();
    for kind in container.collection_kinds() {
        let order = match packed.physical(kind) {
            Some(physical) => physical.to_vec(),
            None => container.table(kind).ids(),
        };
        let mut map = HashMap::with_capacity(order.len());
        for (index, id) in order.into_iter().enumerate() {
            map.entry(id).or_insert(index as u32);
        }
        positions.insert(kind, map);
    }

    let mut resolver = IdResolver {
        layout: container.commands.layout,
        positions,
        packed,
        error: None,
    };
    container.visit_refs_mut(&mut resolver);

    match resolver.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::packer::pack;
    use crate::model::{CommandGroup, Cue, GlobalAisacReference, ReferenceItem, Sequence, Track};
    use crate::schema::SchemaVersion;

    fn offset_container() -> Container {
        let mut container = Container::new("resolve", SchemaVersion::CURRENT);
        container.tracks = vec![Track::new(), Track::new()];
        container.global_aisac_refs = vec![
            GlobalAisacReference::new("a"),
            GlobalAisacReference::new("b"),
        ];
        container.commands.sequence = vec![CommandGroup::new(Vec::new())];

        let mut sequence = Sequence::new();
        sequence.tracks = vec![Ref::Offset(1), Ref::Offset(0)];
        sequence.command = Ref::Offset(0);
        sequence.global_aisacs = vec![Ref::Offset(0), Ref::Offset(1)];
        container.sequences.push(sequence);

        container.cues.push(Cue::new(
            0,
            "cue",
            ReferenceItem {
                item_type: 3,
                handle: Ref::Offset(0),
            },
        ));
        container
    }

    #[test]
    fn test_resolve_offsets() {
        let mut container = offset_container();
        let report = resolve_offsets(&mut container);
        assert!(report.is_clean());
        assert_eq!(report.resolved, 6);

        let sequence = &container.sequences[0];
        assert_eq!(sequence.tracks[0], Ref::Id(container.tracks[1].id));
        assert_eq!(sequence.tracks[1], Ref::Id(container.tracks[0].id));
        assert_eq!(sequence.command, Ref::Id(container.commands.sequence[0].id));
        assert_eq!(container.cues[0].item.handle, Ref::Id(sequence.id));
    }

    #[test]
    fn test_stale_offsets_become_null() {
        let mut container = offset_container();
        container.sequences[0].tracks.push(Ref::Offset(7));
        container.sequences[0].global_aisacs.push(Ref::Offset(9));

        let report = resolve_offsets(&mut container);
        assert_eq!(report.unresolved.len(), 2);
        assert_eq!(report.unresolved[0].offset, 7);

        let sequence = &container.sequences[0];
        // Explicit lists keep the slot, runs drop it.
        assert_eq!(sequence.tracks.len(), 3);
        assert!(sequence.tracks[2].is_null());
        assert_eq!(sequence.global_aisacs.len(), 2);
    }

    #[test]
    fn test_legacy_commands_resolve_against_shared_table() {
        let mut container = Container::new("legacy", SchemaVersion::new(1, 22, 0, 0));
        container.commands.shared = vec![CommandGroup::new(Vec::new()), CommandGroup::new(Vec::new())];
        let mut track = Track::new();
        track.command = Ref::Offset(1);
        track.event = Ref::Offset(0);
        container.tracks.push(track);

        resolve_offsets(&mut container);
        let track = &container.tracks[0];
        assert_eq!(track.command, Ref::Id(container.commands.shared[1].id));
        assert_eq!(track.event, Ref::Id(container.commands.shared[0].id));
        assert_eq!(
            container.normalize(EntityKind::Command(CommandTableKind::TrackEvent)),
            EntityKind::Command(CommandTableKind::Shared)
        );
    }

    #[test]
    fn test_round_trip_offsets() {
        let mut container = offset_container();
        resolve_offsets(&mut container);

        let packed = pack(&container).unwrap();
        resolve_ids(&mut container, &packed).unwrap();

        let sequence = &container.sequences[0];
        let tracks: Vec<Option<u32>> = sequence.tracks.iter().map(Ref::as_numeric).collect();
        assert_eq!(tracks, vec![Some(1), Some(0)]);
        assert_eq!(sequence.command.as_numeric(), Some(0));
        let globals: Vec<Option<u32>> = sequence.global_aisacs.iter().map(Ref::as_numeric).collect();
        assert_eq!(globals, vec![Some(0), Some(1)]);
        assert_eq!(container.cues[0].item.handle.as_numeric(), Some(0));
    }

    #[test]
    fn test_removed_target_is_an_invariant_violation() {
        let mut container = offset_container();
        resolve_offsets(&mut container);
        // Drop a track without detaching it.
        container.tracks.remove(0);

        let packed = pack(&container).unwrap();
        let err = resolve_ids(&mut container, &packed).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(matches!(err, BankError::DanglingReference { .. }));
    }

    #[test]
    fn test_leftover_offset_is_rejected() {
        let mut container = offset_container();
        let packed = PackedLayout::default();
        let err = resolve_ids(&mut container, &packed).unwrap_err();
        assert!(matches!(err, BankError::UnresolvedHandle { .. }));
    }
}
