//! Entity Model Module
//!
//! Every persisted object of a bank carries a stable [`EntityId`]. Cross
//! references are [`Ref`] handles that hold a raw table offset only between
//! the table layer and the resolver; everywhere else they are null or point
//! at a stable id.
//!
//! Each entity type enumerates its own reference fields through
//! [`Entity::visit_refs`] / [`Entity::visit_refs_mut`], so graph walks
//! (resolution, sweeping, packing, copying) never need to know concrete
//! entity types.

pub mod command;
pub mod container;
pub mod entities;
pub mod record;

use std::fmt;

use num_traits::{NumCast, PrimInt, ToPrimitive};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BankError, Result};

pub use command::{opcode, Command, CommandGroup};
pub use container::{CommandLayout, CommandStore, Container, Table};
pub use entities::{
    Aisac, AutoModulation, Cue, GlobalAisacReference, Graph, GraphPoint, ReferenceItem, Sequence,
    StringValue, Synth, Track, TrackTarget, Waveform,
};
pub use record::Record;

/// Stable identity of an entity, preserved across edits and saves.
///
/// The default value is the nil id; entity constructors always mint a
/// fresh one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Mint a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Command table a command-group reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandTableKind {
    Sequence,
    Synth,
    Track,
    TrackEvent,
    /// The single table of the legacy layout.
    Shared,
}

/// Collection an entity lives in, and the target of a reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Cue,
    Sequence,
    Synth,
    Waveform,
    Track,
    ActionTrack,
    Aisac,
    GlobalAisacReference,
    Graph,
    AutoModulation,
    Command(CommandTableKind),
    StringValue,
}

impl EntityKind {
    /// Whether the reachability sweeper may remove entities of this kind.
    pub fn is_sweepable(self) -> bool {
        !matches!(self, EntityKind::Cue | EntityKind::StringValue)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Command(table) => write!(f, "command({:?})", table),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A reference handle.
///
/// `Offset` is a transient state that only exists between reading rows and
/// running the resolver, or between resolving for save and writing rows.
/// Two handles are equal when both are null or both carry the same stable
/// id; offsets never compare equal, not even to themselves.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Ref {
    #[default]
    Null,
    Offset(u32),
    Id(EntityId),
}

impl Ref {
    pub fn to(id: EntityId) -> Self {
        Ref::Id(id)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Ref::Null)
    }

    pub fn as_numeric(&self) -> Option<u32> {
        match self {
            Ref::Offset(offset) => Some(*offset),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<EntityId> {
        match self {
            Ref::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Build a handle from a raw column value. The all-ones value of the
    /// column width is the null sentinel.
    pub fn from_raw<T: PrimInt>(raw: T) -> Self {
        if raw == T::max_value() {
            return Ref::Null;
        }
        match ToPrimitive::to_u32(&raw) {
            Some(offset) => Ref::Offset(offset),
            None => Ref::Null,
        }
    }

    /// Encode an offset-state handle into a column of width `T`.
    pub fn encode<T: PrimInt>(&self, holder: EntityId, field: &'static str) -> Result<T> {
        match self {
            Ref::Null => Ok(T::max_value()),
            Ref::Offset(offset) => {
                let max = ToPrimitive::to_u64(&T::max_value()).unwrap_or(u64::MAX);
                let value = <u64 as From<u32>>::from(*offset);
                let overflow = || BankError::IndexOverflow {
                    field: field.to_string(),
                    value,
                    max: max - 1,
                };
                if value >= max {
                    return Err(overflow());
                }
                <T as NumCast>::from(*offset).ok_or_else(overflow)
            }
            Ref::Id(_) => Err(BankError::UnresolvedHandle { holder, field }),
        }
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Ref::Null, Ref::Null) => true,
            (Ref::Id(a), Ref::Id(b)) => a == b,
            _ => false,
        }
    }
}

impl From<EntityId> for Ref {
    fn from(id: EntityId) -> Self {
        Ref::Id(id)
    }
}

/// How a reference field is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefShape {
    /// A single index column.
    Scalar,
    /// An explicit list of indexes.
    List,
    /// A (start, count) window into a shared table.
    Run,
}

/// Static description of one reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldInfo {
    pub name: &'static str,
    pub target: EntityKind,
    pub shape: RefShape,
    /// Position of a scalar among the handles sharing `name` on one holder.
    pub slot: Option<usize>,
}

impl FieldInfo {
    pub const fn scalar(name: &'static str, target: EntityKind) -> Self {
        Self {
            name,
            target,
            shape: RefShape::Scalar,
            slot: None,
        }
    }

    pub const fn list(name: &'static str, target: EntityKind) -> Self {
        Self {
            name,
            target,
            shape: RefShape::List,
            slot: None,
        }
    }

    pub const fn run(name: &'static str, target: EntityKind) -> Self {
        Self {
            name,
            target,
            shape: RefShape::Run,
            slot: None,
        }
    }

    /// The same field, narrowed to one of its scalar slots.
    pub fn at(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }
}

/// Read-only walk over reference fields.
pub trait RefVisitor {
    fn visit(&mut self, holder: EntityId, field: FieldInfo, handle: &Ref);

    fn visit_list(&mut self, holder: EntityId, field: FieldInfo, handles: &[Ref]) {
        for handle in handles {
            self.visit(holder, field, handle);
        }
    }
}

impl<F> RefVisitor for F
where
    F: FnMut(EntityId, FieldInfo, &Ref),
{
    fn visit(&mut self, holder: EntityId, field: FieldInfo, handle: &Ref) {
        self(holder, field, handle)
    }
}

/// Mutating walk over reference fields.
pub trait RefVisitorMut {
    fn visit(&mut self, holder: EntityId, field: FieldInfo, handle: &mut Ref);

    fn visit_list(&mut self, holder: EntityId, field: FieldInfo, handles: &mut Vec<Ref>) {
        for handle in handles.iter_mut() {
            self.visit(holder, field, handle);
        }
    }
}

impl<F> RefVisitorMut for F
where
    F: FnMut(EntityId, FieldInfo, &mut Ref),
{
    fn visit(&mut self, holder: EntityId, field: FieldInfo, handle: &mut Ref) {
        self(holder, field, handle)
    }
}

/// Capability shared by every persisted entity type.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned {
    fn id(&self) -> EntityId;

    fn set_id(&mut self, id: EntityId);

    /// Visit every reference field of this entity.
    fn visit_refs(&self, visitor: &mut dyn RefVisitor);

    /// Visit every reference field of this entity mutably.
    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut);

    fn into_record(self) -> Record;

    fn from_record(record: Record) -> Option<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_equality() {
        let id = EntityId::new();
        assert_eq!(Ref::Null, Ref::Null);
        assert_eq!(Ref::Id(id), Ref::Id(id));
        assert_ne!(Ref::Id(id), Ref::Id(EntityId::new()));
        assert_ne!(Ref::Offset(3), Ref::Offset(3));
        assert_ne!(Ref::Null, Ref::Id(id));
    }

    #[test]
    fn test_ref_accessors() {
        let id = EntityId::new();
        assert!(Ref::Null.is_null());
        assert_eq!(Ref::Offset(4).as_numeric(), Some(4));
        assert_eq!(Ref::Offset(4).as_id(), None);
        assert_eq!(Ref::to(id).as_id(), Some(id));
        assert_eq!(Ref::from(id).as_numeric(), None);
    }

    #[test]
    fn test_from_raw_sentinels() {
        assert!(Ref::from_raw(0xFFFFu16).is_null());
        assert!(Ref::from_raw(0xFFFF_FFFFu32).is_null());
        assert_eq!(Ref::from_raw(0xFFFFu32).as_numeric(), Some(0xFFFF));
        assert_eq!(Ref::from_raw(7u16).as_numeric(), Some(7));
    }

    #[test]
    fn test_encode_widths() {
        let holder = EntityId::new();
        assert_eq!(Ref::Null.encode::<u16>(holder, "f").unwrap(), 0xFFFF);
        assert_eq!(Ref::Null.encode::<u32>(holder, "f").unwrap(), 0xFFFF_FFFF);
        assert_eq!(Ref::Offset(12).encode::<u16>(holder, "f").unwrap(), 12);
        assert_eq!(Ref::Offset(0x1_0000).encode::<u32>(holder, "f").unwrap(), 0x1_0000);

        let overflow = Ref::Offset(0xFFFF).encode::<u16>(holder, "tracks");
        assert!(matches!(overflow, Err(BankError::IndexOverflow { .. })));

        let unresolved = Ref::Id(EntityId::new()).encode::<u16>(holder, "tracks");
        assert!(matches!(unresolved, Err(BankError::UnresolvedHandle { .. })));
    }

    #[test]
    fn test_encode_overflow_reports_value() {
        let holder = EntityId::new();
        match Ref::Offset(0x1_0000).encode::<u16>(holder, "items") {
            Err(BankError::IndexOverflow { field, value, max }) => {
                assert_eq!(field, "items");
                assert_eq!(value, 0x1_0000);
                assert_eq!(max, 0xFFFE);
            }
            other => panic!("expected overflow, got {:?}", other),
        }
        assert_eq!(Ref::Offset(0xFFFE).encode::<u16>(holder, "items").unwrap(), 0xFFFE);
    }

    #[test]
    fn test_sweepable_kinds() {
        assert!(!EntityKind::Cue.is_sweepable());
        assert!(!EntityKind::StringValue.is_sweepable());
        assert!(EntityKind::ActionTrack.is_sweepable());
        assert!(EntityKind::Command(CommandTableKind::Shared).is_sweepable());
    }
}
