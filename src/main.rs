//! provman CLI entry point
//!
//! Parses the command line, runs the command, and prints failures through
//! [`user_friendly_error`] with a suggestion where one applies.

use anyhow::Result;
use clap::Parser;
use provman_cli::cli;
use provman_cli::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
