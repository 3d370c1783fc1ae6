//! Reversible edit descriptors
//!
//! Every mutating container operation returns an [`EditBatch`]: an ordered
//! list of atomic edits, each carrying the operation that was applied and
//! the operation that undoes it. Storing and replaying them is left to the
//! caller's undo manager.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::archive::{ArchiveKind, AudioRecord};
use crate::model::{EntityId, EntityKind, Ref};

/// Operation that produced an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    /// An entity was appended to a collection.
    Insert,

    /// An entity was removed explicitly.
    Remove,

    /// References to a removed entity were cleared.
    Detach,

    /// The reachability sweeper removed an unused entity.
    Sweep,

    /// A cue closure was copied in from another container.
    CopyCue,

    /// A cue closure was duplicated inside its own container.
    DuplicateCue,

    /// An audio record was imported.
    ImportAudio,
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditKind::Insert => write!(f, "Insert"),
            EditKind::Remove => write!(f, "Remove"),
            EditKind::Detach => write!(f, "Detach"),
            EditKind::Sweep => write!(f, "Sweep"),
            EditKind::CopyCue => write!(f, "Copy Cue"),
            EditKind::DuplicateCue => write!(f, "Duplicate Cue"),
            EditKind::ImportAudio => write!(f, "Import Audio"),
        }
    }
}

/// One atomic state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    /// Put `entity` (a record snapshot) at `index` of `collection`.
    Insert {
        collection: EntityKind,
        index: usize,
        entity: serde_json::Value,
    },

    /// Take the entity at `index` out of `collection`.
    Remove {
        collection: EntityKind,
        index: usize,
        entity: serde_json::Value,
    },

    /// Replace the handles of one reference field. `slot` picks one entry
    /// of a field made of several scalars (synth items, command links);
    /// without it the whole field is replaced.
    SetReferences {
        holder: EntityId,
        field: String,
        #[serde(default)]
        slot: Option<usize>,
        before: Vec<Ref>,
        after: Vec<Ref>,
    },

    AddAudioRecord {
        archive: ArchiveKind,
        id: u16,
        record: AudioRecord,
    },

    RemoveAudioRecord {
        archive: ArchiveKind,
        id: u16,
        record: AudioRecord,
    },
}

impl EditOp {
    /// The operation that undoes this one.
    pub fn inverse(&self) -> EditOp {
        match self.clone() {
            EditOp::Insert {
                collection,
                index,
                entity,
            } => EditOp::Remove {
                collection,
                index,
                entity,
            },
            EditOp::Remove {
                collection,
                index,
                entity,
            } => EditOp::Insert {
                collection,
                index,
                entity,
            },
            EditOp::SetReferences {
                holder,
                field,
                slot,
                before,
                after,
            } => EditOp::SetReferences {
                holder,
                field,
                slot,
                before: after,
                after: before,
            },
            EditOp::AddAudioRecord {
                archive,
                id,
                record,
            } => EditOp::RemoveAudioRecord {
                archive,
                id,
                record,
            },
            EditOp::RemoveAudioRecord {
                archive,
                id,
                record,
            } => EditOp::AddAudioRecord {
                archive,
                id,
                record,
            },
        }
    }
}

/// A single reversible edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversibleEdit {
    /// Unique identifier for this edit.
    pub id: String,

    pub kind: EditKind,

    /// Human-readable description.
    pub description: String,

    pub timestamp: DateTime<Utc>,

    /// What was done.
    pub forward: EditOp,

    /// How to undo it.
    pub inverse: EditOp,
}

impl ReversibleEdit {
    pub fn new(kind: EditKind, description: impl Into<String>, forward: EditOp) -> Self {
        let inverse = forward.inverse();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            description: description.into(),
            timestamp: Utc::now(),
            forward,
            inverse,
        }
    }
}

/// Ordered edits of one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditBatch {
    edits: Vec<ReversibleEdit>,
}

impl EditBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: ReversibleEdit) {
        self.edits.push(edit);
    }

    pub fn record(&mut self, kind: EditKind, description: impl Into<String>, forward: EditOp) {
        self.push(ReversibleEdit::new(kind, description, forward));
    }

    pub fn extend(&mut self, other: EditBatch) {
        self.edits.extend(other.edits);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReversibleEdit> {
        self.edits.iter()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Inverse operations in the order they must be applied to undo the
    /// whole batch.
    pub fn undo_ops(&self) -> Vec<EditOp> {
        self.edits.iter().rev().map(|e| e.inverse.clone()).collect()
    }

    pub fn into_vec(self) -> Vec<ReversibleEdit> {
        self.edits
    }
}

impl IntoIterator for EditBatch {
    type Item = ReversibleEdit;
    type IntoIter = std::vec::IntoIter<ReversibleEdit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.into_iter()
    }
}
