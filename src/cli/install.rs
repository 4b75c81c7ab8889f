//! `provman install`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Context;
use crate::cache::CacheDir;
use crate::constants::LOCK_FILE_NAME;
use crate::core::diagnostics::Severity;
use crate::installer::{InstallMode, Requirements, parse_requirement};
use crate::lockfile::Locks;
use crate::source::VersionConstraints;
use crate::utils::progress::InstallProgress;

#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Required provider, as ADDR or ADDR=CONSTRAINTS (repeatable)
    ///
    /// Without any `--require`, the providers already recorded in the lock
    /// file are installed again under their recorded constraints.
    #[arg(short, long = "require", value_name = "ADDR[=CONSTRAINTS]")]
    pub(super) require: Vec<String>,

    /// Select the newest acceptable versions, ignoring locked selections
    #[arg(short, long)]
    pub(super) upgrade: bool,

    /// Install only from this local directory (repeatable); no other
    /// source is consulted
    #[arg(long = "plugin-dir", value_name = "DIR")]
    plugin_dirs: Vec<PathBuf>,

    /// Dependency lock file to read and update
    #[arg(long, value_name = "PATH", default_value = LOCK_FILE_NAME)]
    lockfile: PathBuf,
}

impl InstallCommand {
    pub(super) async fn execute(self, ctx: &Context) -> Result<()> {
        let reqs = self.requirements()?;
        let mode = if self.upgrade { InstallMode::Upgrade } else { InstallMode::NewProvidersOnly };

        let progress = Arc::new(if ctx.show_progress { InstallProgress::new() } else { InstallProgress::hidden() });
        let installer = ctx
            .settings
            .installer(Arc::new(CacheDir::new(&ctx.cache_dir)), self.plugin_dirs.clone())?
            .with_events(progress);

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let outcome = installer.install_with_lock_file(&cancel, &self.lockfile, &reqs, mode).await?;

        for diag in outcome.diagnostics.iter().filter(|d| d.severity == Severity::Warning) {
            eprintln!("{}: {}: {}", "warning".yellow(), diag.summary, diag.detail);
        }
        if ctx.quiet {
            return Ok(());
        }

        if outcome.executables.is_empty() {
            println!("No providers to install.");
            return Ok(());
        }
        println!("\n{}", "Providers ready:".green().bold());
        for (provider, exe) in &outcome.executables {
            let version = outcome
                .locks
                .provider(provider)
                .map(|lock| lock.version().to_string())
                .unwrap_or_default();
            println!("  {} {} {}", provider.to_string().bold(), version, exe.display());
        }
        Ok(())
    }

    fn requirements(&self) -> Result<Requirements> {
        if !self.require.is_empty() {
            return self
                .require
                .iter()
                .map(|given| parse_requirement(given).map_err(anyhow::Error::from))
                .collect();
        }

        let locks = Locks::load(&self.lockfile)?;
        debug!("no --require given, using the {} provider(s) in {}", locks.len(), self.lockfile.display());
        Ok(locks
            .all_providers()
            .map(|lock| {
                (
                    lock.provider().clone(),
                    lock.version_constraints().cloned().unwrap_or_else(VersionConstraints::default),
                )
            })
            .collect())
    }
}

