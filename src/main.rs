//! # zotero2readwise CLI (`zt2rw`)
//!
//! ## Usage
//!
//! ```bash
//! zt2rw --config ./config/zt2rw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `zt2rw sync` | Upload Zotero annotations (and optionally notes) to Readwise |
//! | `zt2rw export` | Write the mapped highlights as JSON instead of uploading |
//! | `zt2rw check` | Show configured credentials and verify them against both services |
//!
//! Credentials usually come from the environment (`ZOTERO_KEY`,
//! `ZOTERO_LIBRARY_ID`, `LIBRARY_TYPE`, `READWISE_TOKEN`); a `.env` file in
//! the working directory is loaded first.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use zotero2readwise::progress::ProgressMode;
use zotero2readwise::sync::SyncArgs;
use zotero2readwise::{check, config, export, sync};

const DEFAULT_CONFIG: &str = "./config/zt2rw.toml";

/// Sync Zotero annotations and notes to Readwise.
#[derive(Parser)]
#[command(name = "zt2rw", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/zt2rw.toml`; a missing default file is fine
    /// when everything comes from the environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload annotations to Readwise.
    ///
    /// Highlights are keyed by Zotero item and annotation, so rerunning
    /// updates them instead of creating duplicates.
    Sync {
        /// Also sync Zotero notes.
        #[arg(long)]
        include_notes: bool,

        /// Skip annotations (use with --include-notes).
        #[arg(long)]
        no_annotations: bool,

        /// Only sync annotations of this color (palette name or hex). Repeatable.
        #[arg(long = "filter-color", value_name = "COLOR")]
        filter_colors: Vec<String>,

        /// Only fetch items modified after this Zotero library version.
        #[arg(long, value_name = "VERSION")]
        since: Option<u64>,

        /// Ignore the stored checkpoint and fetch everything.
        #[arg(long)]
        full: bool,

        /// Fetch and map only; upload nothing.
        #[arg(long)]
        dry_run: bool,

        /// Write failed items to the failed-items directory as JSON.
        #[arg(long)]
        save_failures: bool,

        /// Progress on stderr. Defaults to human on a TTY, off otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Export mapped highlights as JSON.
    Export {
        /// Output file path. Writes to stdout if not specified.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show configured credentials and verify them.
    Check,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("zotero2readwise=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let mut cfg = config::load_config(&path, required)?;
    cfg.apply_env()?;

    match cli.command {
        Commands::Sync {
            include_notes,
            no_annotations,
            filter_colors,
            since,
            full,
            dry_run,
            save_failures,
            progress,
        } => {
            let args = SyncArgs {
                include_notes,
                no_annotations,
                filter_colors,
                since,
                full,
                dry_run,
                save_failures,
            };
            args.apply(&mut cfg);
            cfg.validate()?;
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();
            sync::run_sync_command(&cfg, &args, reporter.as_ref())?;
        }
        Commands::Export { output } => {
            cfg.validate()?;
            let reporter = ProgressMode::default_for_tty().reporter();
            export::run_export(&cfg, output.as_deref(), reporter.as_ref())?;
        }
        Commands::Check => {
            check::run_check(&cfg)?;
        }
    }

    Ok(())
}
