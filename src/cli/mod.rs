//! Command-line interface for provman.
//!
//! # Commands
//!
//! - `install` - resolve, fetch and lock the required providers
//! - `cache list` - show the packages present in the cache directory
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - debug logging
//! - `--quiet` / `-q` - errors only, no progress output
//! - `--no-progress` - hide progress bars (same as `PROVMAN_NO_PROGRESS=1`)
//! - `--config` / `-c` - settings file (same as `PROVMAN_CONFIG_PATH`)
//! - `--cache-dir` - target cache directory (same as `PROVMAN_CACHE_DIR`)
//!
//! Without `--verbose` or `--quiet` the log filter comes from `RUST_LOG`,
//! falling back to `warn`.

mod cache;
mod install;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{Settings, get_cache_dir};
use crate::utils::progress::is_progress_disabled;

#[derive(Parser, Debug)]
#[command(
    name = "provman",
    about = "Provider dependency installer and lock file manager",
    version,
    long_about = "provman selects provider versions that satisfy your constraints, installs them into a \
                  local cache and records the selection in a dependency lock file."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Hide progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    /// Path to the settings file
    #[arg(short, long, global = true, env = "PROVMAN_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Directory receiving installed providers
    #[arg(long, global = true, env = "PROVMAN_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the required providers and update the lock file
    Install(install::InstallCommand),

    /// Inspect the provider cache
    Cache(cache::CacheCommand),
}

/// Values shared by every command.
pub(crate) struct Context {
    pub settings: Settings,
    pub cache_dir: PathBuf,
    pub show_progress: bool,
    pub quiet: bool,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        self.init_logging();

        let settings = match &self.config {
            Some(path) if path.exists() => Settings::load_from(path)?,
            Some(_) => Settings::default(),
            None => Settings::load()?,
        };
        let cache_dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => get_cache_dir()?,
        };
        let ctx = Context {
            settings,
            cache_dir,
            show_progress: !(self.quiet || self.no_progress || is_progress_disabled()),
            quiet: self.quiet,
        };

        match self.command {
            Commands::Install(cmd) => cmd.execute(&ctx).await,
            Commands::Cache(cmd) => cmd.execute(&ctx),
        }
    }

    fn log_filter(&self) -> EnvFilter {
        if self.verbose {
            EnvFilter::new("debug")
        } else if self.quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    }

    fn init_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.log_filter())
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .try_init();
    }
}
