//! Cuebank CLI
//!
//! Command-line interface for inspecting and editing audio bank files.

use clap::Parser;
use env_logger::Env;
use log::info;

use cuebank::cli::commands;
use cuebank::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter)).init();

    info!("Cuebank v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = cli.command else {
        println!("Cuebank v{}", env!("CARGO_PKG_VERSION"));
        println!("Use --help for available commands");
        return Ok(());
    };

    let mut session =
        commands::build_session(cli.config.as_deref(), cli.target_version.as_deref())?;

    match command {
        Commands::Inspect { bank } => commands::inspect(&bank, &mut session),
        Commands::Sweep { bank, output } => {
            commands::sweep(&bank, output.as_deref(), &mut session)
        }
        Commands::CopyCue {
            from,
            to,
            cue,
            output,
        } => commands::copy_cue(&from, &to, cue, output.as_deref(), &mut session),
        Commands::ImportWav {
            bank,
            wav,
            streaming,
            name,
        } => commands::import_wav(&bank, &wav, streaming, name.as_deref(), &mut session),
        Commands::Verify { path } => commands::verify(&path, &mut session),
    }
}
