//! provman - provider dependency installer and lock file manager
//!
//! provman takes the version constraints a configuration places on its
//! providers, selects a concrete version of each, installs the matching
//! package for the current platform into a local cache directory, and
//! records the selections and package checksums in a dependency lock file
//! so later runs reproduce them exactly.
//!
//! # Architecture Overview
//!
//! - A provider is named by a source address `hostname/namespace/type`
//!   ([`addrs`]).
//! - A [`source::Source`] answers two questions: which versions exist, and
//!   where the package for one version and platform lives. Sources compose:
//!   [`source::MultiSource`] routes by address pattern and
//!   [`source::MemoizeSource`] caches answers for the length of a run.
//! - A [`cache::CacheDir`] holds unpacked packages keyed by address,
//!   version and platform, and installs new ones atomically.
//! - [`lockfile::Locks`] is the in-memory form of `.provman.lock.hcl`, with
//!   a diagnostics-reporting decoder and a deterministic encoder.
//! - The [`installer::Installer`] ties them together: choose a version per
//!   provider, verify or fetch its package, and produce new locks.
//!
//! # Core Modules
//!
//! - [`addrs`] - provider source addresses
//! - [`source`] - versions, constraints, platforms, package hashes and sources
//! - [`cache`] - the package cache directory
//! - [`lockfile`] - the dependency lock file
//! - [`installer`] - version selection and installation
//!
//! # Supporting Modules
//!
//! - [`config`] - cache directory discovery and `provman.toml`
//! - [`core`] - diagnostics and user-facing errors
//! - [`cli`] - the `provman` command line
//! - [`utils`] - filesystem helpers and progress rendering
//! - [`constants`] - well-known names and tuning values
//!
//! # Lock File Format (.provman.lock.hcl)
//!
//! ```hcl
//! # This file is maintained automatically by "provman install".
//! # Manual edits may be lost in future updates.
//!
//! provider "registry.terraform.io/hashicorp/null" {
//!   version     = "2.1.0"
//!   constraints = ">= 2.0.0"
//!
//!   hashes {
//!     linux_amd64 = [
//!       "h1:...",
//!       "zh:...",
//!     ]
//!   }
//! }
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! # Install providers and write the lock file
//! provman install --require 'hashicorp/null=>= 2.0.0'
//!
//! # Reinstall exactly what the lock file records
//! provman install
//!
//! # Move to the newest acceptable versions
//! provman install --upgrade --require 'hashicorp/null=>= 2.0.0'
//!
//! # Install offline from local directories only
//! provman install --plugin-dir ./vendor/providers --require hashicorp/null
//!
//! # Show what is cached
//! provman cache list
//! ```

pub mod addrs;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod installer;
pub mod lockfile;
pub mod source;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
