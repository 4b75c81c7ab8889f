//! Integration test suite for provman
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **install_flow**: installer runs against filesystem mirrors
//! - **lock_file**: lock file handling across runs
//! - **http_mirror**: installing from a network mirror
//! - **cli_install**: the `provman install` command
//! - **cli_cache**: the `provman cache` command

#[path = "../common/mod.rs"]
mod common;

mod cli_cache;
mod cli_install;
mod http_mirror;
mod install_flow;
mod lock_file;
