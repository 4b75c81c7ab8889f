//! On-disk provider package cache.
//!
//! A [`CacheDir`] stores unpacked packages under
//! `<base>/<hostname>/<namespace>/<type>/<version>/<os_arch>/` and answers
//! lookups for one target platform, normally the current one.
//!
//! # Scanning
//!
//! The directory tree is the only index. The first lookup scans it and
//! keeps the result until [`CacheDir::refresh`] is called or an install
//! completes, so callers decide when the filesystem is re-read.
//!
//! # Installing
//!
//! [`CacheDir::install_package`] materializes a package from a local
//! archive, another unpacked directory, or a URL. Work happens in a private
//! staging directory under `<base>/.tmp/` and the finished package is
//! renamed into place, so readers never observe a partial package.
//! Installs of the same package are serialized with a per-package
//! [`CacheLock`]; installing identical content twice is a no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use provman_cli::cache::CacheDir;
//! use provman_cli::addrs::Provider;
//!
//! let cache = CacheDir::new(".provman/providers");
//! let null = Provider::new_default("hashicorp", "null").unwrap();
//! if let Some(cached) = cache.provider_latest_version(&null) {
//!     println!("{} at {}", cached.version, cached.executable_file.display());
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::addrs::Provider;
use crate::constants::HTTP_REQUEST_TIMEOUT;
use crate::source::{PackageHash, PackageLocation, PackageMeta, Platform, Version};

mod cached_provider;
mod install;
pub mod lock;
pub mod scan;

pub use cached_provider::{CachedProvider, executable_name};
pub use install::InstalledPackage;
pub use lock::CacheLock;

/// Staging area for in-progress installs, relative to the cache base.
pub const STAGING_DIR: &str = ".tmp";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write provider package to {}: {reason}", path.display())]
    CacheWriteFailure {
        path: PathBuf,
        reason: String,
    },

    #[error("the package for {provider} {version} ({platform}) does not match any of the expected checksums")]
    HashMismatch {
        provider: Provider,
        version: Version,
        platform: Platform,
        expected: Vec<PackageHash>,
        actual: PackageHash,
    },

    #[error("failed to download {url}: {message}")]
    Download {
        url: String,
        message: String,
    },

    #[error("invalid provider package at {location}: {reason}")]
    InvalidPackage {
        location: String,
        reason: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl CacheError {
    pub(crate) fn write(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::CacheWriteFailure {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

type Index = BTreeMap<Provider, Vec<CachedProvider>>;

/// A provider cache directory for one target platform.
#[derive(Debug)]
pub struct CacheDir {
    base_dir: PathBuf,
    target_platform: Platform,
    scanned: RwLock<Option<Arc<Index>>>,
    http: reqwest::Client,
}

impl CacheDir {
    /// A cache for the current platform.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_platform(base_dir, Platform::current())
    }

    /// A cache answering for an explicit platform.
    pub fn with_platform(base_dir: impl Into<PathBuf>, target_platform: Platform) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_dir: base_dir.into(),
            target_platform,
            scanned: RwLock::new(None),
            http,
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub fn target_platform(&self) -> &Platform {
        &self.target_platform
    }

    /// Where the package for `provider`/`version` lives for the target
    /// platform, whether or not it exists.
    #[must_use]
    pub fn package_dir(&self, provider: &Provider, version: &Version) -> PathBuf {
        package_dir_in(&self.base_dir, provider, version, &self.target_platform)
    }

    /// Forget the last scan; the next lookup re-reads the filesystem.
    pub fn refresh(&self) {
        *self.scanned.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Newest unpacked version of `provider` for the target platform.
    #[must_use]
    pub fn provider_latest_version(&self, provider: &Provider) -> Option<CachedProvider> {
        self.index().get(provider).and_then(|list| list.last().cloned())
    }

    /// The unpacked package for exactly `version`, if present.
    #[must_use]
    pub fn provider_version(&self, provider: &Provider, version: &Version) -> Option<CachedProvider> {
        self.index()
            .get(provider)
            .and_then(|list| list.iter().find(|c| &c.version == version).cloned())
    }

    /// Every unpacked package for the target platform, grouped by provider,
    /// versions ascending.
    #[must_use]
    pub fn all_available_packages(&self) -> BTreeMap<Provider, Vec<CachedProvider>> {
        (*self.index()).clone()
    }

    /// Install a package, returning where it landed and its content hash.
    ///
    /// When `allowed_hashes` is non-empty the package must match one of
    /// them; otherwise the install fails with [`CacheError::HashMismatch`]
    /// and the cache is left untouched. Hashes carried by `meta` itself are
    /// checked the same way.
    pub async fn install_package(
        &self,
        cancel: &CancellationToken,
        meta: &PackageMeta,
        allowed_hashes: &[PackageHash],
    ) -> Result<InstalledPackage, CacheError> {
        let installed = install::install_package(self, cancel, meta, allowed_hashes).await?;
        self.refresh();
        Ok(installed)
    }

    /// Copy a package from another cache directory into this one.
    pub async fn link_from_other_cache(
        &self,
        cancel: &CancellationToken,
        other: &CachedProvider,
        allowed_hashes: &[PackageHash],
    ) -> Result<InstalledPackage, CacheError> {
        let meta = other.package_meta(&self.target_platform);
        self.install_package(cancel, &meta, allowed_hashes).await
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn index(&self) -> Arc<Index> {
        if let Some(index) = self.scanned.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Arc::clone(index);
        }

        let mut index = Index::new();
        for pkg in scan::scan_packages(&self.base_dir) {
            if pkg.platform != self.target_platform {
                continue;
            }
            let PackageLocation::LocalDir(package_dir) = pkg.location else {
                continue;
            };
            index.entry(pkg.provider.clone()).or_default().push(CachedProvider::from_package_dir(
                pkg.provider,
                pkg.version,
                &self.target_platform,
                package_dir,
            ));
        }
        for list in index.values_mut() {
            list.sort_by(|a, b| a.version.cmp(&b.version));
        }
        debug!(
            target: "provman::cache",
            "scanned {} ({} providers for {})",
            self.base_dir.display(),
            index.len(),
            self.target_platform
        );

        let index = Arc::new(index);
        *self.scanned.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&index));
        index
    }
}

/// Package directory for any platform under `base_dir`.
#[must_use]
pub fn package_dir_in(
    base_dir: &Path,
    provider: &Provider,
    version: &Version,
    platform: &Platform,
) -> PathBuf {
    base_dir
        .join(provider.hostname.as_str())
        .join(&provider.namespace)
        .join(&provider.type_name)
        .join(version.to_string())
        .join(platform.to_string())
}
