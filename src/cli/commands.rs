//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use walkdir::WalkDir;

use crate::archive::{ArchiveKind, AudioRecord};
use crate::bank::{self, BankFile};
use crate::model::{Container, Cue, Entity, EntityKind, ReferenceItem};
use crate::schema::SchemaVersion;
use crate::session::{Session, SessionConfig};

/// Build the session for one CLI run.
pub fn build_session(config: Option<&Path>, target_version: Option<&str>) -> Result<Session> {
    let mut config = match config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to read session config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(version) = target_version {
        let version: SchemaVersion = version
            .parse()
            .with_context(|| format!("Invalid target version '{}'", version))?;
        config.target_version = Some(version);
    }
    Ok(Session::open(config)?)
}

fn open_bank(path: &Path, session: &mut Session) -> Result<Container> {
    bank::open(path, session).with_context(|| format!("Failed to load bank {}", path.display()))
}

/// Save with the session's sweep policy and write the result.
fn write_bank(container: &mut Container, path: &Path, session: &mut Session) -> Result<()> {
    let (file, swept) = session.save_bank(container)?;
    if !swept.is_empty() {
        println!("Swept {} unused entities before saving", swept.len());
    }
    bank::write_file(path, &file)
        .with_context(|| format!("Failed to write bank {}", path.display()))?;
    println!("Bank saved: {}", path.display());
    Ok(())
}

/// Print entity counts and the cue list of a bank.
pub fn inspect(path: &Path, session: &mut Session) -> Result<()> {
    let container = open_bank(path, session)?;

    println!("Bank: {}", container.name);
    println!("Schema version: {}", container.version);
    println!("Command layout: {:?}", container.commands.layout);
    println!("{:-<60}", "");

    for kind in container.collection_kinds() {
        println!("{:<28} {:>6}", kind.to_string(), container.table(kind).len());
    }
    println!(
        "{:<28} {:>6}",
        "memory audio records",
        container.memory_archive.len()
    );
    println!(
        "{:<28} {:>6}",
        "stream audio records",
        container.stream_archive.len()
    );

    println!("{:-<60}", "");
    if container.cues.is_empty() {
        println!("No cues.");
    }
    for cue in &container.cues {
        let target = match cue.item.target() {
            Some(kind) => kind.to_string(),
            None => "none".to_string(),
        };
        println!("{:>6}  {:<32} -> {}", cue.cue_id, cue.name, target);
    }

    session.persist()?;
    Ok(())
}

/// Remove unreachable entities and save.
pub fn sweep(path: &Path, output: Option<&Path>, session: &mut Session) -> Result<()> {
    info!("Sweeping bank: {}", path.display());

    let mut container = open_bank(path, session)?;
    let (report, _) = session.sweep(&mut container);

    println!(
        "Removed {} entities in {} passes",
        report.removed, report.passes
    );
    for (kind, count) in &report.removed_by_kind {
        println!("  {:<26} {:>6}", kind.to_string(), count);
    }
    if report.truncated {
        warn!("Sweep hit its pass bound; some unreachable entities may remain");
    }

    write_bank(&mut container, output.unwrap_or(path), session)?;
    session.persist()?;
    Ok(())
}

/// Copy a cue from one bank into another.
pub fn copy_cue(
    from: &Path,
    to: &Path,
    cue_id: u32,
    output: Option<&Path>,
    session: &mut Session,
) -> Result<()> {
    info!(
        "Copying cue {} from {} into {}",
        cue_id,
        from.display(),
        to.display()
    );

    let source = open_bank(from, session)?;
    let mut dest = open_bank(to, session)?;

    let Some(cue) = source.cue_by_cue_id(cue_id) else {
        bail!("No cue with id {} in {}", cue_id, from.display());
    };
    let outcome = session.copy_cue(&mut dest, &source, cue.id)?;

    println!(
        "Copied {} entities and {} audio records",
        outcome.copied, outcome.audio_records
    );
    if let Some(new_id) = outcome.cue_id {
        if new_id != cue_id {
            println!("Cue id {} was taken; the copy uses {}", cue_id, new_id);
        }
    }

    write_bank(&mut dest, output.unwrap_or(to), session)?;
    session.persist()?;
    Ok(())
}

/// Import a WAV file as a waveform with its own cue.
pub fn import_wav(
    path: &Path,
    wav: &Path,
    streaming: bool,
    name: Option<&str>,
    session: &mut Session,
) -> Result<()> {
    info!("Importing {} into {}", wav.display(), path.display());

    let mut container = open_bank(path, session)?;
    let record = AudioRecord::from_wav(wav)?;
    let archive = if streaming {
        ArchiveKind::Stream
    } else {
        ArchiveKind::Memory
    };

    let (waveform, _) = container.import_audio(archive, record)?;
    let Some(cue_id) = container.free_cue_id(0) else {
        bail!("No free cue id left in {}", path.display());
    };
    let name = match name {
        Some(name) => name.to_string(),
        None => wav
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("cue_{}", cue_id)),
    };
    let cue = Cue::new(cue_id, name.clone(), ReferenceItem::waveform(waveform));
    container.insert(EntityKind::Cue, cue.into_record())?;

    println!("Added cue {} '{}' in the {} archive", cue_id, name, archive.as_str());
    write_bank(&mut container, path, session)?;
    session.persist()?;
    Ok(())
}

/// Load and re-save a bank in memory, comparing table digests.
fn verify_file(path: &Path, session: &mut Session) -> Result<bool> {
    let file: BankFile = bank::read_file(path)?;
    let container = bank::load(&file.tables, session)?;
    let saved = bank::save_tables(&container, session.catalog(), container.version)?;

    let before = file.tables.digest();
    let after = saved.digest();
    if before == after {
        println!("ok        {}", path.display());
        Ok(true)
    } else {
        println!("MISMATCH  {}", path.display());
        info!("{}: {} != {}", path.display(), before, after);
        Ok(false)
    }
}

/// Verify one bank, or every `.json` bank under a directory.
pub fn verify(path: &Path, session: &mut Session) -> Result<()> {
    let files: Vec<PathBuf> = if path.is_dir() {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    let mut failed = 0;
    for file in &files {
        match verify_file(file, session) {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                println!("ERROR     {}: {}", file.display(), e);
                failed += 1;
            }
        }
    }

    println!("{:-<60}", "");
    println!("{} banks checked, {} failed", files.len(), failed);
    session.persist()?;

    if failed > 0 {
        bail!("{} of {} banks did not round-trip", failed, files.len());
    }
    Ok(())
}
