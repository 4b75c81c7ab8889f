//! `provman cache` subcommands.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::Context;
use crate::cache::CacheDir;

#[derive(Args, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
enum CacheSubcommand {
    /// List the packages installed for this platform, newest version last
    List {
        /// Also print each package's h1: hash
        #[arg(long)]
        hashes: bool,
    },
}

impl CacheCommand {
    pub(super) fn execute(self, ctx: &Context) -> Result<()> {
        match self.command {
            CacheSubcommand::List {
                hashes,
            } => list(ctx, hashes),
        }
    }
}

fn list(ctx: &Context, hashes: bool) -> Result<()> {
    let cache = CacheDir::new(&ctx.cache_dir);
    let packages = cache.all_available_packages();

    if packages.is_empty() {
        println!("No providers cached in {} for {}", ctx.cache_dir.display(), cache.target_platform());
        return Ok(());
    }

    println!(
        "{} ({}, {})",
        "Cached providers".bold(),
        ctx.cache_dir.display(),
        cache.target_platform()
    );
    for (provider, versions) in &packages {
        println!("  {}", provider.to_string().green());
        for cached in versions {
            if hashes {
                println!("    {} {}", cached.version, cached.hash()?);
            } else {
                println!("    {} {}", cached.version, cached.executable_file.display());
            }
        }
    }
    Ok(())
}
