//! Error handling for cuebank
//!
//! Structural problems in a bank abort the whole load or save. Stale offsets
//! are not errors: the resolver degrades them to null and reports them.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{EntityId, EntityKind};
use crate::schema::SchemaVersion;

/// Result type alias for cuebank operations
pub type Result<T> = std::result::Result<T, BankError>;

/// Main error type for cuebank operations
#[derive(Error, Debug)]
pub enum BankError {
    // Load Errors
    #[error("Malformed input: {table}.{column} is missing in version {version}")]
    MalformedInput {
        table: String,
        column: String,
        version: SchemaVersion,
    },

    #[error("Unknown command table layout: neither CommandTable nor the split command tables are present")]
    UnknownCommandTableLayout,

    #[error("Table {table} is missing")]
    MissingTable { table: String },

    #[error("Invalid schema version: {version}")]
    InvalidSchemaVersion { version: String },

    #[error("Invalid packed data in {table}.{column} row {row}: {reason}")]
    InvalidPackedData {
        table: String,
        column: String,
        row: usize,
        reason: String,
    },

    // Save Errors
    #[error("Index overflow in {field}: {value} does not fit (maximum {max})")]
    IndexOverflow { field: String, value: u64, max: u64 },

    #[error("Dangling reference: {holder} field {field} points at {target} which is not in the {kind:?} table")]
    DanglingReference {
        holder: EntityId,
        field: &'static str,
        target: EntityId,
        kind: EntityKind,
    },

    #[error("Reference in {field} of {holder} is still a raw offset")]
    UnresolvedHandle {
        holder: EntityId,
        field: &'static str,
    },

    // Edit Errors
    #[error("Entity not found: {id}")]
    EntityNotFound { id: EntityId },

    #[error("Cue not found: {id}")]
    CueNotFound { id: EntityId },

    #[error("Entity kind mismatch: expected {expected:?}")]
    KindMismatch { expected: EntityKind },

    #[error("Audio record {id} not found in the {archive} archive")]
    AudioRecordNotFound { id: u16, archive: &'static str },

    // Audio Errors
    #[error("Invalid audio file: {reason}")]
    InvalidAudio { reason: String },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Serialization Errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BankError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            BankError::MalformedInput { .. } => "MALFORMED_INPUT",
            BankError::UnknownCommandTableLayout => "UNKNOWN_COMMAND_TABLE_LAYOUT",
            BankError::MissingTable { .. } => "MISSING_TABLE",
            BankError::InvalidSchemaVersion { .. } => "INVALID_SCHEMA_VERSION",
            BankError::InvalidPackedData { .. } => "INVALID_PACKED_DATA",
            BankError::IndexOverflow { .. } => "INDEX_OVERFLOW",
            BankError::DanglingReference { .. } => "DANGLING_REFERENCE",
            BankError::UnresolvedHandle { .. } => "UNRESOLVED_HANDLE",
            BankError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            BankError::CueNotFound { .. } => "CUE_NOT_FOUND",
            BankError::KindMismatch { .. } => "KIND_MISMATCH",
            BankError::AudioRecordNotFound { .. } => "AUDIO_RECORD_NOT_FOUND",
            BankError::InvalidAudio { .. } => "INVALID_AUDIO",
            BankError::FileNotFound { .. } => "FILE_NOT_FOUND",
            BankError::FileReadError { .. } => "FILE_READ_ERROR",
            BankError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            BankError::Json(_) => "JSON_ERROR",
            BankError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if the caller can reasonably retry after fixing its input.
    ///
    /// Invariant violations (`DanglingReference`, `UnresolvedHandle`) are
    /// never recoverable: they mean the graph was edited without clearing
    /// referencers.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BankError::EntityNotFound { .. }
                | BankError::CueNotFound { .. }
                | BankError::KindMismatch { .. }
                | BankError::AudioRecordNotFound { .. }
                | BankError::FileNotFound { .. }
                | BankError::InvalidAudio { .. }
        )
    }

    /// Returns true for errors raised by a broken internal invariant.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            BankError::DanglingReference { .. } | BankError::UnresolvedHandle { .. }
        )
    }
}
