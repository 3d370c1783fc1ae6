//! CLI Module
//!
//! Command-line interface for inspecting and editing bank files.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cuebank - inspect, clean and edit audio bank files
#[derive(Parser, Debug)]
#[command(name = "cuebank")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Session config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Save banks as this schema version, e.g. 1.28.0.0
    #[arg(long, global = true)]
    pub target_version: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show entity counts and cues of a bank
    #[command(name = "inspect")]
    Inspect {
        /// Path to the bank
        bank: PathBuf,
    },

    /// Remove unreachable entities
    #[command(name = "sweep")]
    Sweep {
        /// Path to the bank
        bank: PathBuf,

        /// Output path (defaults to overwriting the bank)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Copy a cue and everything it uses into another bank
    #[command(name = "copy-cue")]
    CopyCue {
        /// Bank to copy from
        #[arg(long)]
        from: PathBuf,

        /// Bank to copy into
        #[arg(long)]
        to: PathBuf,

        /// Cue id in the source bank
        #[arg(long)]
        cue: u32,

        /// Output path (defaults to overwriting the destination)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add a WAV file as a new waveform and cue
    #[command(name = "import-wav")]
    ImportWav {
        /// Path to the bank
        bank: PathBuf,

        /// WAV file to import
        wav: PathBuf,

        /// Store in the stream archive instead of memory
        #[arg(long)]
        streaming: bool,

        /// Name of the new cue (defaults to the file stem)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Check that banks survive a load and save unchanged
    #[command(name = "verify")]
    Verify {
        /// Bank file, or a directory searched recursively
        path: PathBuf,
    },
}
