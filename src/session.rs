//! Editing session context.
//!
//! A session owns the schema catalog and the settings of one editing run.
//! It is created once and handed by reference to load, save, sweep and
//! copy; nothing in the crate keeps global state.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::bank::{self, BankFile};
use crate::edit::{EditBatch, EditKind};
use crate::error::{BankError, Result};
use crate::graph::sweeper::DEFAULT_MAX_PASSES;
use crate::graph::{clean_up_tables, copy_cue, CopyOutcome, SweepReport};
use crate::model::{Container, EntityId};
use crate::schema::{SchemaCatalog, SchemaVersion};

/// Settings of a session, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bound on sweeper passes.
    pub max_sweep_passes: usize,

    /// Sweep unreachable entities before every save.
    pub sweep_before_save: bool,

    /// File the schema catalog is kept in between sessions.
    pub catalog_path: Option<PathBuf>,

    /// Version banks are saved as. Defaults to each bank's own version.
    pub target_version: Option<SchemaVersion>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sweep_passes: DEFAULT_MAX_PASSES,
            sweep_before_save: true,
            catalog_path: None,
            target_version: None,
        }
    }
}

impl SessionConfig {
    /// Load a config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
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

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| BankError::FileWriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// One editing session.
#[derive(Debug, Clone)]
pub struct Session {
    catalog: SchemaCatalog,
    config: SessionConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    /// Session with a fresh catalog seeded with the known column ranges.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            catalog: SchemaCatalog::with_builtin_ranges(),
            config,
        }
    }

    /// Session whose catalog is read from `config.catalog_path` when that
    /// file exists.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let catalog = match &config.catalog_path {
            Some(path) if path.exists() => {
                let catalog = SchemaCatalog::load(path)?;
                info!("Loaded schema catalog with {} columns from {:?}", catalog.len(), path);
                catalog
            }
            _ => SchemaCatalog::with_builtin_ranges(),
        };
        Ok(Self { catalog, config })
    }

    /// Write the catalog back to `catalog_path`, if one is configured.
    pub fn persist(&self) -> Result<()> {
        if let Some(path) = &self.config.catalog_path {
            self.catalog.save(path)?;
            debug!("Saved schema catalog to {:?}", path);
        }
        Ok(())
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut SchemaCatalog {
        &mut self.catalog
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Version `container` is saved as.
    pub fn target_version(&self, container: &Container) -> SchemaVersion {
        self.config.target_version.unwrap_or(container.version)
    }

    /// Sweep `container` with the configured pass bound.
    pub fn sweep(&self, container: &mut Container) -> (SweepReport, EditBatch) {
        clean_up_tables(container, self.config.max_sweep_passes)
    }

    /// Copy `cue` and everything it reaches from `source` into `dest`.
    pub fn copy_cue(
        &self,
        dest: &mut Container,
        source: &Container,
        cue: EntityId,
    ) -> Result<CopyOutcome> {
        copy_cue(dest, source, cue, EditKind::CopyCue)
    }

    /// Load a bank file.
    pub fn load_bank(&mut self, file: BankFile) -> Result<Container> {
        file.into_container(self)
    }

    /// Save `container`, sweeping it first when configured to.
    ///
    /// The sweep runs on a staged copy. Only a successful save replaces the
    /// container with it and returns the sweep's edits; on error the
    /// container is untouched.
    pub fn save_bank(&mut self, container: &mut Container) -> Result<(BankFile, EditBatch)> {
        if !self.config.sweep_before_save {
            let file = self.bank_file(container)?;
            return Ok((file, EditBatch::new()));
        }

        let mut staged = container.clone();
        let (_, edits) = self.sweep(&mut staged);
        let file = self.bank_file(&staged)?;
        *container = staged;
        Ok((file, edits))
    }

    fn bank_file(&mut self, container: &Container) -> Result<BankFile> {
        Ok(BankFile {
            tables: bank::save(container, self)?,
            memory_archive: container.memory_archive.clone(),
            stream_archive: container.stream_archive.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cue, Ref, ReferenceItem, Sequence, Synth};
    use crate::schema::columns::{CUE_NAME, CUE_TABLE, SEQUENCE_TABLE};
    use crate::schema::ColumnKey;
    use crate::tables::{TableAccessor, ValueType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_sweep_passes, 64);
        assert!(config.sweep_before_save);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_config_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        fs::write(&path, r#"{ "sweep_before_save": false }"#).unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert!(!config.sweep_before_save);
        assert_eq!(config.max_sweep_passes, DEFAULT_MAX_PASSES);
    }

    #[test]
    fn test_catalog_persists_between_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let config = SessionConfig {
            catalog_path: Some(temp_dir.path().join("catalog.json")),
            ..SessionConfig::default()
        };

        let old = SchemaVersion::new(1, 3, 0, 0);
        let key = ColumnKey::new(CUE_TABLE, CUE_NAME, ValueType::Str);
        let mut first = Session::open(config.clone()).unwrap();
        first.catalog_mut().record_absent(&key, old);
        first.persist().unwrap();

        let second = Session::open(config).unwrap();
        assert!(!second.catalog().exists(&key, old));
        assert_eq!(second.catalog(), first.catalog());
    }

    #[test]
    fn test_save_bank_sweeps_first() {
        let mut container = Container::new("session", SchemaVersion::CURRENT);
        let kept = Sequence::new();
        container.cues.push(Cue::new(0, "kept", ReferenceItem::sequence(kept.id)));
        container.sequences.push(kept);
        container.sequences.push(Sequence::new());

        let mut session = Session::default();
        let (file, edits) = session.save_bank(&mut container).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(container.sequences.len(), 1);
        let table = file.tables.column_table(SEQUENCE_TABLE).unwrap();
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_save_bank_without_sweep() {
        let mut container = Container::new("session", SchemaVersion::CURRENT);
        container.sequences.push(Sequence::new());

        let mut session = Session::new(SessionConfig {
            sweep_before_save: false,
            ..SessionConfig::default()
        });
        let (file, edits) = session.save_bank(&mut container).unwrap();
        assert!(edits.is_empty());
        let table = file.tables.column_table(SEQUENCE_TABLE).unwrap();
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_failed_save_leaves_container_unswept() {
        let mut container = Container::new("session", SchemaVersion::CURRENT);
        let mut synth = Synth::new();
        // A command group that is not in any command table.
        synth.command = Ref::Id(EntityId::new());
        container.cues.push(Cue::new(0, "broken", ReferenceItem::synth(synth.id)));
        container.synths.push(synth);
        container.sequences.push(Sequence::new());
        let before = container.clone();

        let mut session = Session::default();
        let err = session.save_bank(&mut container).unwrap_err();
        assert_eq!(err.error_code(), "DANGLING_REFERENCE");
        assert_eq!(container, before);
        assert_eq!(container.sequences.len(), 1);
    }
}
