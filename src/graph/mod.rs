//! Graph Module
//!
//! Whole-graph passes over a [`Container`](crate::model::Container):
//! - `resolver`: offset to id after load, id to offset before save
//! - `packer`: physical slots for contiguous-run reference lists
//! - `sweeper`: reachability cleanup to a fixpoint
//! - `copy`: closure copy between containers

pub mod copy;
pub mod packer;
pub mod resolver;
pub mod sweeper;

pub use copy::{copy_cue, copy_entity, CopyOutcome};
pub use packer::{pack, PackedLayout, RunSlot};
pub use resolver::{resolve_ids, resolve_offsets, ResolveReport, UnresolvedReference};
pub use sweeper::{clean_up_tables, SweepReport};
