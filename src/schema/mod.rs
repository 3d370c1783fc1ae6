//! Schema Module
//!
//! Bank schema versions, the column catalog, and the column layout.

pub mod catalog;
pub mod columns;
pub mod version;

pub use catalog::{ColumnKey, ColumnRange, SchemaCatalog};
pub use version::SchemaVersion;
