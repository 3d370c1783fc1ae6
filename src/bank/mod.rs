//! Bank persistence
//!
//! Moves a bank between its column-table form and a [`Container`]. Load
//! reads rows into entities holding raw offsets and resolves them to ids.
//! Save packs the run tables, resolves ids back to offsets on a staged copy
//! and writes tables for the target schema version.
//!
//! On disk a bank is a JSON document holding its tables and both audio
//! archives.

pub mod codec;
pub mod layout;
pub mod load;
pub mod save;

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::archive::AudioArchive;
use crate::error::{BankError, Result};
use crate::model::Container;
use crate::session::Session;
use crate::tables::TableSet;

pub use load::load_tables;
pub use save::{command_layout_for, convert_commands, save_tables};

/// A bank as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankFile {
    pub tables: TableSet,
    #[serde(default)]
    pub memory_archive: AudioArchive,
    #[serde(default)]
    pub stream_archive: AudioArchive,
}

impl BankFile {
    /// Load the bank's entities into a container that owns the archives.
    pub fn into_container(self, session: &mut Session) -> Result<Container> {
        let mut container = load(&self.tables, session)?;
        container.memory_archive = self.memory_archive;
        container.stream_archive = self.stream_archive;
        Ok(container)
    }
}

/// Read a bank file.
pub fn read_file(path: &Path) -> Result<BankFile> {
    if !path.exists() {
        return Err(BankError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path).map_err(|e| BankError::FileReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Write a bank file as pretty JSON.
pub fn write_file(path: &Path, file: &BankFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| BankError::FileWriteError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }
    let content = serde_json::to_string_pretty(file)?;
    fs::write(path, content).map_err(|e| BankError::FileWriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load `tables` into a container, recording observed columns in the
/// session's catalog.
///
/// Stale offsets are tolerated and become null; they are logged by the
/// resolver.
pub fn load(tables: &TableSet, session: &mut Session) -> Result<Container> {
    let (container, report) = load_tables(tables, session.catalog_mut())?;
    if !report.is_clean() {
        warn!(
            "{} references in '{}' pointed outside their tables and were cleared",
            report.unresolved.len(),
            container.name
        );
    }
    Ok(container)
}

/// Write `container` as tables of the session's target version, or of the
/// container's own version when the session names none.
pub fn save(container: &Container, session: &mut Session) -> Result<TableSet> {
    let version = session.target_version(container);
    save_tables(container, session.catalog(), version)
}

/// Read and load a bank file.
pub fn open(path: &Path, session: &mut Session) -> Result<Container> {
    read_file(path)?.into_container(session)
}

/// Save `container` and write it with its archives to `path`.
pub fn store(container: &Container, path: &Path, session: &mut Session) -> Result<()> {
    let file = BankFile {
        tables: save(container, session)?,
        memory_archive: container.memory_archive.clone(),
        stream_archive: container.stream_archive.clone(),
    };
    write_file(path, &file)
}
