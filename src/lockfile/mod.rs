//! Dependency lock file for reproducible provider installs.
//!
//! The lock file (`.provman.lock.hcl`) pins every provider a configuration
//! uses to one selected version and records, per target platform, the
//! package hashes that version is trusted to have. It is written by
//! `provman install` and read back at the start of every later run.
//!
//! # Format
//!
//! ```text
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
//!     ]
//!   }
//! }
//! ```
//!
//! Every value in the file must already be in canonical form. Decoding a
//! non-canonical address, version or constraint string is an error rather
//! than a silent fix-up, so the file on disk always equals what encoding the
//! decoded value would produce. Encoding regenerates the whole file and does
//! not preserve comments or layout.
//!
//! # Absent versus empty
//!
//! [`ProviderLock`] distinguishes "no constraints recorded" (`None`) from an
//! explicit empty constraint string, and "no hashes block" (`None`) from a
//! hashes block whose platform lists are empty. Both states survive a
//! round trip.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use provman_cli::lockfile::Locks;
//!
//! # fn example() -> anyhow::Result<()> {
//! let locks = Locks::load(Path::new(".provman.lock.hcl"))?;
//! for lock in locks.all_providers() {
//!     println!("{} {}", lock.provider(), lock.version());
//! }
//! locks.save(Path::new(".provman.lock.hcl"))?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::addrs::{Provider, is_lockable};
use crate::core::diagnostics::Diagnostics;
use crate::source::{PackageHash, Platform, Version, VersionConstraints};

pub mod decode;
pub mod encode;
mod io;
pub mod syntax;

pub use decode::decode_locks;
pub use encode::encode_locks;

#[derive(Debug, Error)]
pub enum LockFileError {
    #[error("the lock file {} is invalid:\n{diagnostics}", path.display())]
    MalformedLockFile {
        path: PathBuf,
        diagnostics: Diagnostics,
    },

    #[error("failed to access lock file {}: {message}", path.display())]
    Io {
        path: PathBuf,
        message: String,
    },

    #[error("{provider} is a special provider that is not eligible for dependency locking")]
    NotLockable {
        provider: Provider,
    },
}

/// The lock recorded for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLock {
    addr: Provider,
    version: Version,
    /// Never an empty set.
    constraints: Option<VersionConstraints>,
    hashes: Option<BTreeMap<Platform, Vec<PackageHash>>>,
}

impl ProviderLock {
    #[must_use]
    pub fn new(
        addr: Provider,
        version: Version,
        constraints: Option<VersionConstraints>,
        hashes: Option<BTreeMap<Platform, Vec<PackageHash>>>,
    ) -> Self {
        let mut lock = Self {
            addr,
            version,
            constraints: constraints.filter(|c| !c.is_empty()),
            hashes: None,
        };
        if let Some(hashes) = hashes {
            let map = lock.hashes.get_or_insert_with(BTreeMap::new);
            for (platform, list) in hashes {
                let entry = map.entry(platform).or_default();
                for hash in list {
                    if !entry.contains(&hash) {
                        entry.push(hash);
                    }
                }
            }
        }
        lock
    }

    #[must_use]
    pub fn provider(&self) -> &Provider {
        &self.addr
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    #[must_use]
    pub fn version_constraints(&self) -> Option<&VersionConstraints> {
        self.constraints.as_ref()
    }

    /// The per-platform hash lists, or `None` when no hashes were recorded.
    #[must_use]
    pub fn hashes(&self) -> Option<&BTreeMap<Platform, Vec<PackageHash>>> {
        self.hashes.as_ref()
    }

    /// Hashes recorded for one platform. `None` when that platform has no
    /// entry, `Some(&[])` for an explicit empty list.
    #[must_use]
    pub fn hashes_for(&self, platform: &Platform) -> Option<&[PackageHash]> {
        self.hashes.as_ref()?.get(platform).map(Vec::as_slice)
    }

    /// Every recorded hash across all platforms, sorted and deduplicated.
    #[must_use]
    pub fn all_hashes(&self) -> Vec<PackageHash> {
        let mut all: Vec<PackageHash> = self
            .hashes
            .iter()
            .flat_map(BTreeMap::values)
            .flatten()
            .cloned()
            .collect();
        all.sort();
        all.dedup();
        all
    }

    #[must_use]
    pub fn contains_hash(&self, platform: &Platform, hash: &PackageHash) -> bool {
        self.hashes_for(platform).is_some_and(|list| list.contains(hash))
    }

    /// Record additional hashes for `platform`. Existing entries are kept;
    /// hashes are only ever appended.
    pub fn add_hashes(&mut self, platform: &Platform, hashes: impl IntoIterator<Item = PackageHash>) {
        let entry = self
            .hashes
            .get_or_insert_with(BTreeMap::new)
            .entry(platform.clone())
            .or_default();
        for hash in hashes {
            if !entry.contains(&hash) {
                entry.push(hash);
            }
        }
    }
}

/// All provider locks of one configuration, keyed by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locks {
    providers: BTreeMap<Provider, ProviderLock>,
}

impl Locks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn provider(&self, addr: &Provider) -> Option<&ProviderLock> {
        self.providers.get(addr)
    }

    /// Insert or replace the lock for `lock.provider()`.
    pub fn set_provider(&mut self, lock: ProviderLock) -> Result<(), LockFileError> {
        if !is_lockable(&lock.addr) {
            return Err(LockFileError::NotLockable {
                provider: lock.addr,
            });
        }
        self.providers.insert(lock.addr.clone(), lock);
        Ok(())
    }

    pub fn remove_provider(&mut self, addr: &Provider) -> Option<ProviderLock> {
        self.providers.remove(addr)
    }

    /// Locks in address order.
    pub fn all_providers(&self) -> impl Iterator<Item = &ProviderLock> {
        self.providers.values()
    }

    /// Whether both values record exactly the same locks, hashes included.
    #[must_use]
    pub fn equal(&self, other: &Self) -> bool {
        self == other
    }

    /// Whether both values lock the same set of providers, regardless of the
    /// versions or hashes recorded.
    #[must_use]
    pub fn equal_provider_address(&self, other: &Self) -> bool {
        self.providers.keys().eq(other.providers.keys())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }
}
