//! harmonyhelper - practice tracks from ensemble MIDI files
//!
//! Subcommands:
//! - `harmonyhelper inspect <input>` - Summarize tracks, chords, panning and tempo
//! - `harmonyhelper convert <input> [output]` - Apply transforms and write the result

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod flags;

use flags::TransformFlags;

#[derive(Parser, Debug)]
#[command(name = "harmonyhelper")]
#[command(about = "Turn ensemble MIDI files into part-practice tracks")]
#[command(version)]
struct Cli {
    /// Config file used instead of ./harmonyhelper.toml
    #[arg(short, long, global = true, env = "HARMONYHELPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize a .mid or .csv file
    Inspect {
        /// Input file (.mid, .midi or .csv)
        input: PathBuf,

        /// Print the survey as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transform a file into a practice track
    Convert {
        /// Input file (.mid, .midi or .csv)
        input: PathBuf,

        /// Output file; the type follows its extension.
        /// Default: <input stem><suffix>.<default_format> from the config
        output: Option<PathBuf>,

        #[command(flatten)]
        transform: TransformFlags,

        /// Drop note-offs with no sounding note before loading
        #[arg(long)]
        lenient: bool,

        /// Print the steps that would run without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = harmonyconf::HarmonyConfig::load_with_sources_from(cli.config.as_deref())?;
    init_tracing(&config.logging.level);
    for file in &sources.files {
        tracing::debug!("loaded config {}", file.display());
    }
    for var in &sources.env_overrides {
        tracing::debug!("config override from ${}", var);
    }

    match cli.command {
        Commands::Inspect { input, json } => {
            commands::inspect(&input, json)?;
        }
        Commands::Convert {
            input,
            output,
            transform,
            lenient,
            dry_run,
        } => {
            let options = commands::ConvertOptions {
                input,
                output,
                lenient,
                dry_run,
            };
            commands::convert(&config, &transform, &options)?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// `RUST_LOG` already lands in `level` through the config overlay.
fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
