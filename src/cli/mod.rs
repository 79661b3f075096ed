//! Command-line interface for cardsync
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::engine::{EngineSettings, SyncEngine};
use crate::error::{Error, Result};
use crate::graph::GraphClient;
use crate::output::OutputOptions;
use crate::vault::Vault;

mod init;
mod reorder;
mod status;
mod sync;
mod watch;

/// cardsync - markdown kanban cards <-> remote task lists
///
/// Keeps checklists in tagged markdown cards and task lists on a remote
/// to-do service in step, in both directions.
#[derive(Parser, Debug)]
#[command(name = "cardsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the vault (defaults to current directory)
    #[arg(long, global = true, env = "CARDSYNC_VAULT")]
    pub vault: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default .cardsync.toml into the vault
    Init,

    /// Fetch both sides and show what a sync would do
    Status {
        /// List every pending change instead of just the totals
        #[arg(long)]
        verbose: bool,
    },

    /// Fetch both sides, then apply the pending changes
    Sync,

    /// Watch the vault and sync periodically until interrupted
    Watch,

    /// Sort the checklists of a card by status
    Reorder {
        /// Card document to reorder (relative to the vault or absolute)
        file: PathBuf,

        /// Print the result instead of writing it back
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let root = resolve_vault_root(self.vault)?;
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        match self.command {
            Commands::Init => init::run(&root, output),
            Commands::Reorder { file, dry_run } => reorder::run(&root, &file, dry_run, output),
            Commands::Status { verbose } => block_on(status::run(&root, verbose, output)),
            Commands::Sync => block_on(sync::run(&root, output)),
            Commands::Watch => block_on(watch::run(&root, output)),
        }
    }
}

fn resolve_vault_root(vault: Option<PathBuf>) -> Result<PathBuf> {
    let start = match vault {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    if !start.is_dir() {
        return Err(Error::VaultNotFound(start));
    }
    // Watcher events carry absolute paths; keep the root comparable.
    Ok(std::fs::canonicalize(&start)?)
}

fn block_on<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

/// Everything a remote-facing command needs.
pub(crate) struct Session {
    pub config: Config,
    pub vault: Vault,
    pub engine: Arc<SyncEngine>,
}

impl Session {
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load_from_vault(root)?;
        let vault = Vault::open(root, &config.vault)?;
        let client = GraphClient::from_config(&config.remote)?;
        let engine = SyncEngine::new(
            Arc::new(vault.clone()),
            Arc::new(client),
            EngineSettings::from_config(&config),
        );
        Ok(Self {
            config,
            vault,
            engine: Arc::new(engine),
        })
    }
}
