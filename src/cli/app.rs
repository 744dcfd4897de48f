//! Main CLI application structure

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::commands;
use super::output::{Output, OutputFormat};
use crate::domain::ValueKind;
use crate::storage::StoreConfig;

/// Environment variable holding the log filter
const LOG_ENV: &str = "PREFS_LOG";

#[derive(Parser)]
#[command(name = "prefs")]
#[command(author, version, about = "Inspect and edit prefstore preference files")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Preferences file (defaults to the configured file)
    #[arg(long, global = true, env = "PREFS_FILE")]
    pub file: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value stored under a key
    Get {
        key: String,

        /// Printed when the key is absent
        #[arg(long)]
        default: Option<String>,
    },

    /// Store a value
    Set {
        key: String,

        value: String,

        /// Value type; sets take a comma-separated list
        #[arg(long, short, default_value = "string")]
        kind: ValueKind,
    },

    /// Remove a key
    Remove { key: String },

    /// Remove every key
    Clear,

    /// List all entries sorted by key
    List,

    /// Print whether a key is present
    Contains { key: String },

    /// Print changes made to the file by other processes
    Watch,
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = Output::new(cli.format);
    let config = match &cli.config {
        Some(path) => StoreConfig::load_from(path)?,
        None => StoreConfig::load().context("Failed to load configuration")?,
    };
    let file = config.resolve_file(cli.file.as_deref())?;
    debug!(file = %file.display(), "resolved preferences file");

    let prefs = commands::open(&file, &config)?;

    match cli.command {
        Commands::Get { key, default } => commands::get(&output, &prefs, &key, default.as_deref())?,
        Commands::Set { key, value, kind } => commands::set(&output, &prefs, &key, kind, &value)?,
        Commands::Remove { key } => commands::remove(&output, &prefs, &key)?,
        Commands::Clear => commands::clear(&output, &prefs)?,
        Commands::List => commands::list(&output, &prefs),
        Commands::Contains { key } => commands::contains(&output, &prefs, &key),
        Commands::Watch => commands::watch(&output, &prefs, &config)?,
    }

    prefs.flush();
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
