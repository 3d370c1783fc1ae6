//! Audio archives
//!
//! Raw audio records addressed by a 16-bit archive id. The graph never looks
//! inside the bytes; waveforms only carry ids into one of the two archives
//! of their bank.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BankError, Result};

/// Which archive of a bank a waveform id points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// Loaded fully into memory with the bank.
    Memory,
    /// Streamed from a separate file.
    Stream,
}

impl ArchiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveKind::Memory => "memory",
            ArchiveKind::Stream => "stream",
        }
    }
}

/// One encoded audio payload plus the metadata the bank needs about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRecord {
    /// Encoded audio bytes (opaque).
    pub data: Vec<u8>,
    /// Number of channels.
    pub channels: u8,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of samples per channel.
    pub num_samples: u32,
    /// Loop start in samples, if the record loops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_start: Option<u32>,
    /// Loop end in samples, if the record loops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_end: Option<u32>,
}

impl AudioRecord {
    pub fn new(data: Vec<u8>, channels: u8, sample_rate: u32, num_samples: u32) -> Self {
        Self {
            data,
            channels,
            sample_rate,
            num_samples,
            loop_start: None,
            loop_end: None,
        }
    }

    /// Read a WAV file as a record. The file bytes are kept verbatim.
    pub fn from_wav(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BankError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let reader = hound::WavReader::open(path).map_err(|e| BankError::InvalidAudio {
            reason: format!("Failed to open WAV file: {}", e),
        })?;
        let spec = reader.spec();
        let num_samples = reader.duration();

        let channels = u8::try_from(spec.channels).map_err(|_| BankError::InvalidAudio {
            reason: format!("{} channels is more than a waveform can hold", spec.channels),
        })?;

        let data = fs::read(path).map_err(|e| BankError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(Self::new(data, channels, spec.sample_rate, num_samples))
    }

    pub fn is_looping(&self) -> bool {
        self.loop_start.is_some() && self.loop_end.is_some()
    }
}

/// Records of one archive keyed by archive id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioArchive {
    records: BTreeMap<u16, AudioRecord>,
}

impl AudioArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u16) -> Option<&AudioRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.records.contains_key(&id)
    }

    /// Lowest id not yet in use.
    pub fn next_free_id(&self) -> Option<u16> {
        (0..u16::MAX).find(|id| !self.records.contains_key(id))
    }

    /// Add a record under the lowest free id.
    pub fn add(&mut self, record: AudioRecord) -> Result<u16> {
        let id = self.next_free_id().ok_or_else(|| BankError::IndexOverflow {
            field: "audio archive".to_string(),
            value: self.records.len() as u64,
            max: u64::from(u16::MAX - 1),
        })?;
        self.records.insert(id, record);
        Ok(id)
    }

    /// Insert or replace a record under a fixed id.
    pub fn insert_at(&mut self, id: u16, record: AudioRecord) -> Option<AudioRecord> {
        self.records.insert(id, record)
    }

    pub fn remove(&mut self, id: u16) -> Option<AudioRecord> {
        self.records.remove(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.records.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
