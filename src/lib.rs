//! Cuebank - entity-graph persistence for audio banks
//!
//! An audio bank is a set of versioned column tables whose rows reference
//! each other by table offset. Cuebank loads a bank into a graph of entities
//! that reference each other by stable id, lets that graph be edited freely,
//! and writes it back as tables for any known schema version.
//!
//! # Architecture
//!
//! - `tables` and `schema`: the typed tables of a bank and which columns
//!   exist in which schema version
//! - `model`: entities, reference handles and the container that owns them
//! - `graph`: offset/id resolution, reachability sweeping, run packing and
//!   cross-bank copying
//! - `bank`: load and save between tables and a container
//! - `edit`: reversible descriptions of every mutation
//! - `session`: the explicit context one editing run carries around

pub mod archive;
pub mod bank;
pub mod cli;
pub mod edit;
pub mod error;
pub mod graph;
pub mod model;
pub mod schema;
pub mod session;
pub mod tables;

pub use error::{BankError, Result};
pub use model::{Container, EntityId, EntityKind, Ref};
pub use session::{Session, SessionConfig};
