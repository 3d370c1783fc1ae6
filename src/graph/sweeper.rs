//! Reachability sweeper
//!
//! Removes entities that no live entity references. Removing an entity can
//! orphan what it referenced, so passes repeat until one removes nothing.
//! Cues are roots and string values are kept by policy.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info, warn};

use crate::edit::{EditBatch, EditKind, EditOp};
use crate::model::{Container, EntityId, EntityKind, FieldInfo, Ref};

/// Default bound on sweep passes.
pub const DEFAULT_MAX_PASSES: usize = 64;

/// Outcome of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Passes run, including the final pass that removed nothing.
    pub passes: usize,
    /// Total entities removed.
    pub removed: usize,
    pub removed_by_kind: BTreeMap<EntityKind, usize>,
    /// True when the pass bound was hit before a fixpoint.
    pub truncated: bool,
}

/// Ids referenced by any reference field of any live entity.
fn used_ids(container: &Container) -> HashSet<EntityId> {
    let mut used = HashSet::new();
    container.visit_refs(&mut |_: EntityId, _: FieldInfo, handle: &Ref| {
        if let Some(id) = handle.as_id() {
            used.insert(id);
        }
    });
    used
}

/// Sweep `container` to a fixpoint, at most `max_passes` passes.
pub fn clean_up_tables(container: &mut Container, max_passes: usize) -> (SweepReport, EditBatch) {
    let mut report = SweepReport::default();
    let mut batch = EditBatch::new();

    loop {
        if report.passes >= max_passes {
            warn!(
                "Sweep stopped after {} passes without reaching a fixpoint",
                report.passes
            );
            report.truncated = true;
            break;
        }
        report.passes += 1;

        let used = used_ids(container);
        let mut removed_this_pass = 0;

        for kind in container.collection_kinds() {
            if !kind.is_sweepable() {
                continue;
            }
            let collection = container.normalize(kind);
            let table = container.table_mut(kind);
            for index in (0..table.len()).rev() {
                let Some(id) = table.id_at(index) else {
                    continue;
                };
                if used.contains(&id) {
                    continue;
                }
                if let Some(record) = table.remove_at(index) {
                    batch.record(
                        EditKind::Sweep,
                        format!("Remove unused {} {}", record.type_name(), id),
                        EditOp::Remove {
                            collection,
                            index,
                            entity: record.snapshot(),
                        },
                    );
                    *report.removed_by_kind.entry(kind).or_insert(0) += 1;
                    removed_this_pass += 1;
                }
            }
        }

        debug!("Sweep pass {} removed {} entities", report.passes, removed_this_pass);
        report.removed += removed_this_pass;
        if removed_this_pass == 0 {
            break;
        }
    }

    if report.removed > 0 {
        info!(
            "Sweep removed {} unused entities in {} passes",
            report.removed, report.passes
        );
    }
    (report, batch)
}
