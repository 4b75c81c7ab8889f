//! Provider installation: choose versions, fetch packages, update locks.
//!
//! The [`Installer`] takes the merged [`Requirements`] of a configuration,
//! the current [`Locks`], and an [`InstallMode`], and makes sure a package
//! for every required provider is present in the target [`CacheDir`] for its
//! platform. It returns the new locks and the executable path of every
//! provider; persisting the locks is left to the caller, or done once at
//! the end by [`Installer::install_with_lock_file`].
//!
//! # Per-provider flow
//!
//! 1. In [`InstallMode::NewProvidersOnly`] a locked version is authoritative.
//!    If it still satisfies the constraints and the cache already holds a
//!    package matching the locked hashes, it is used as-is and no source is
//!    consulted at all.
//! 2. Otherwise the source is asked for available versions and one is picked
//!    by [`select_version`] under the configured [`SelectionPolicy`]
//!    ([`InstallMode::Upgrade`] always picks the newest).
//! 3. A package missing from the cache is copied from the global plugin
//!    cache when one is configured and holds it, or fetched from the source.
//!    Hashes already locked for the version and platform must match; a
//!    mismatch is a [`ProviderInstallError::HashMismatch`] and aborts the
//!    whole run.
//! 4. The hashes of the installed package are appended to the lock entry.
//!    Existing hashes are never removed or replaced.
//!
//! # Failures
//!
//! Providers are processed concurrently and independently. Resolution
//! failures are collected and reported together as
//! [`InstallerError::ProvidersFailed`], with one diagnostic per provider.
//! A hash mismatch cancels the remaining work and is reported on its own.
//! On any error no new locks are produced.
//!
//! # Offline mode
//!
//! [`Installer::from_plugin_dirs`] replaces every configured source with the
//! given local directories. Providers that cannot be found there are
//! reported as [`InstallerError::ProvidersUnavailableOffline`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use provman_cli::cache::CacheDir;
//! use provman_cli::installer::{InstallMode, Installer, Requirements, parse_requirement};
//! use provman_cli::source::HttpMirrorSource;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let source = Arc::new(HttpMirrorSource::new("https://mirror.example.com/providers/")?);
//! let installer = Installer::new(source, Arc::new(CacheDir::new(".provman/providers")));
//!
//! let reqs: Requirements = [parse_requirement("hashicorp/null=>= 2.0.0")?].into_iter().collect();
//! let outcome = installer
//!     .install_with_lock_file(
//!         &CancellationToken::new(),
//!         Path::new(".provman.lock.hcl"),
//!         &reqs,
//!         InstallMode::NewProvidersOnly,
//!     )
//!     .await?;
//! for (provider, exe) in &outcome.executables {
//!     println!("{provider}: {}", exe.display());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::addrs::{Provider, is_lockable};
use crate::cache::{CacheDir, CacheError, CachedProvider, InstalledPackage};
use crate::constants::default_parallelism;
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::lockfile::{LockFileError, Locks, ProviderLock};
use crate::source::{
    FilesystemMirrorSource, HashScheme, MultiSource, MultiSourceSelector, PackageHash, PackageMeta,
    Platform, Source, SourceError, Version, VersionConstraints,
};

mod events;
mod requirements;
mod selection;

pub use events::{InstallerEvents, NoopEvents};
pub use requirements::{RequirementError, Requirements, parse_requirement};
pub use selection::{SelectionPolicy, closest_versions, select_version};

/// How many available versions to mention when constraints cannot be met.
const CLOSEST_VERSIONS_SHOWN: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallMode {
    /// Keep locked versions; only resolve providers without a lock.
    #[default]
    NewProvidersOnly,
    /// Ignore locked versions and select the newest acceptable ones.
    Upgrade,
}

fn join_providers(providers: &[Provider]) -> String {
    providers.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn join_versions(versions: &[Version]) -> String {
    versions.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn closest_hint(closest: &[Version]) -> String {
    if closest.is_empty() {
        "; no versions are available".to_string()
    } else {
        format!("; the newest available versions are {}", join_versions(closest))
    }
}

fn supported_hint(supported: &[Platform]) -> String {
    if supported.is_empty() {
        String::new()
    } else {
        let list: Vec<String> = supported.iter().map(ToString::to_string).collect();
        format!("; it is available for {}", list.join(", "))
    }
}

/// Why one provider could not be installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderInstallError {
    #[error("provider {provider} was not found in {origin}")]
    ProviderNotKnown {
        provider: Provider,
        origin: String,
    },

    #[error("provider {provider} {version} is not available for {platform}{}", supported_hint(.supported))]
    PlatformNotSupported {
        provider: Provider,
        version: Version,
        platform: Platform,
        supported: Vec<Platform>,
    },

    #[error("no available version of {provider} matches the constraints \"{constraints}\"{}", closest_hint(.closest))]
    ConstraintUnsatisfiable {
        provider: Provider,
        constraints: VersionConstraints,
        closest: Vec<Version>,
    },

    #[error("the locked version {locked} of {provider} does not match the constraints \"{constraints}\"")]
    LockedVersionConflict {
        provider: Provider,
        locked: Version,
        constraints: VersionConstraints,
    },

    #[error("the package for {provider} {version} ({platform}) does not match any checksum recorded for it (got {actual})")]
    HashMismatch {
        provider: Provider,
        version: Version,
        platform: Platform,
        expected: Vec<PackageHash>,
        actual: PackageHash,
    },

    #[error("{provider} is not eligible for installation: legacy addresses must name a namespace")]
    Unlockable {
        provider: Provider,
    },

    #[error("failed to query available versions of {provider}: {message}")]
    QueryFailed {
        provider: Provider,
        message: String,
    },

    #[error("failed to fetch {provider} {version}: {message}")]
    FetchFailed {
        provider: Provider,
        version: Version,
        message: String,
    },

    #[error("failed to install {provider} into the cache: {message}")]
    CacheWriteFailure {
        provider: Provider,
        message: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderInstallError {
    #[must_use]
    pub fn summary(&self) -> &'static str {
        match self {
            Self::ProviderNotKnown { .. } => "Failed to query available provider packages",
            Self::PlatformNotSupported { .. } => "Incompatible provider version",
            Self::ConstraintUnsatisfiable { .. } => "Failed to resolve provider packages",
            Self::LockedVersionConflict { .. } => "Locked provider version does not match configuration",
            Self::HashMismatch { .. } => "Provider package checksum mismatch",
            Self::Unlockable { .. } => "Invalid provider address",
            Self::QueryFailed { .. } => "Failed to query available provider packages",
            Self::FetchFailed { .. } | Self::CacheWriteFailure { .. } => "Failed to install provider",
            Self::Cancelled => "Operation cancelled",
        }
    }

    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut detail = self.to_string();
        if matches!(self, Self::LockedVersionConflict { .. }) {
            detail.push_str(". Run with upgrade mode to select a new version.");
        }
        Diagnostic::error(self.summary(), detail)
    }

    /// Whether the failure means the provider simply was not found.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ProviderNotKnown { .. }
                | Self::PlatformNotSupported { .. }
                | Self::ConstraintUnsatisfiable { .. }
        )
    }

    fn from_source(provider: &Provider, err: SourceError) -> Self {
        match err {
            SourceError::ProviderNotKnown { provider, origin } => Self::ProviderNotKnown { provider, origin },
            SourceError::PlatformNotSupported {
                provider,
                version,
                platform,
                supported,
            } => Self::PlatformNotSupported {
                provider,
                version,
                platform,
                supported,
            },
            SourceError::Cancelled => Self::Cancelled,
            other => Self::QueryFailed {
                provider: provider.clone(),
                message: other.to_string(),
            },
        }
    }

    fn from_cache(provider: &Provider, version: &Version, err: CacheError) -> Self {
        match err {
            CacheError::HashMismatch {
                provider,
                version,
                platform,
                expected,
                actual,
            } => Self::HashMismatch {
                provider,
                version,
                platform,
                expected,
                actual,
            },
            CacheError::Cancelled => Self::Cancelled,
            CacheError::CacheWriteFailure { .. } => Self::CacheWriteFailure {
                provider: provider.clone(),
                message: err.to_string(),
            },
            CacheError::Download { .. } | CacheError::InvalidPackage { .. } => Self::FetchFailed {
                provider: provider.clone(),
                version: version.clone(),
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("the package for {provider} {version} ({platform}) does not match any checksum recorded in the lock file (got {actual})")]
    HashMismatch {
        provider: Provider,
        version: Version,
        platform: Platform,
        expected: Vec<PackageHash>,
        actual: PackageHash,
    },

    #[error(transparent)]
    LockFile(#[from] LockFileError),

    #[error("failed to install {} provider(s):\n{diagnostics}", .diagnostics.errors().count())]
    ProvidersFailed {
        diagnostics: Diagnostics,
    },

    #[error("providers not available in the given plugin directories: {}", join_providers(.providers))]
    ProvidersUnavailableOffline {
        providers: Vec<Provider>,
        dirs: Vec<PathBuf>,
        diagnostics: Diagnostics,
    },

    #[error("installation cancelled")]
    Cancelled,
}

/// Result of a successful run.
#[derive(Debug, Clone, Default)]
pub struct InstallOutcome {
    /// Locks for exactly the required, lockable providers.
    pub locks: Locks,
    pub executables: BTreeMap<Provider, PathBuf>,
    /// Warnings gathered along the way.
    pub diagnostics: Diagnostics,
}

struct Resolved {
    cached: CachedProvider,
    lock: ProviderLock,
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    tokio::select! {
        () = cancel.cancelled() => Err(SourceError::Cancelled),
        r = fut => r,
    }
}

pub struct Installer {
    source: Arc<dyn Source>,
    target: Arc<CacheDir>,
    global_cache: Option<Arc<CacheDir>>,
    policy: SelectionPolicy,
    max_parallel: usize,
    events: Arc<dyn InstallerEvents>,
    offline_dirs: Option<Vec<PathBuf>>,
}

impl Installer {
    pub fn new(source: Arc<dyn Source>, target: Arc<CacheDir>) -> Self {
        Self {
            source,
            target,
            global_cache: None,
            policy: SelectionPolicy::default(),
            max_parallel: default_parallelism(),
            events: Arc::new(NoopEvents),
            offline_dirs: None,
        }
    }

    /// An installer that only looks in `dirs`, in order, and never
    /// contacts any other source.
    pub fn from_plugin_dirs(dirs: Vec<PathBuf>, target: Arc<CacheDir>) -> Self {
        let selectors = dirs
            .iter()
            .map(|dir| MultiSourceSelector::new(Arc::new(FilesystemMirrorSource::new(dir.clone()))))
            .collect();
        let mut installer = Self::new(Arc::new(MultiSource::new(selectors)), target);
        installer.offline_dirs = Some(dirs);
        installer
    }

    /// Consult and populate a shared cache before fetching from the source.
    #[must_use]
    pub fn with_global_cache(mut self, global: Arc<CacheDir>) -> Self {
        self.global_cache = Some(global);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn InstallerEvents>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn target(&self) -> &CacheDir {
        &self.target
    }

    /// Make sure every required provider is installed, returning new locks.
    pub async fn ensure_provider_versions(
        &self,
        cancel: &CancellationToken,
        locks: &Locks,
        reqs: &Requirements,
        mode: InstallMode,
    ) -> Result<InstallOutcome, InstallerError> {
        let run = cancel.child_token();

        let mut work = Vec::with_capacity(reqs.len());
        for (provider, constraints) in reqs.iter() {
            if provider.is_builtin() {
                debug!(target: "provman::installer", "{provider} is built in");
                self.events.builtin_provider_available(provider);
                continue;
            }
            work.push((provider.clone(), constraints.clone()));
        }
        let pending: Vec<Provider> = work.iter().map(|(p, _)| p.clone()).collect();
        self.events.pending_providers(&pending);

        for lock in locks.all_providers() {
            if reqs.get(lock.provider()).is_none() {
                debug!(target: "provman::installer", "dropping lock for {}, no longer required", lock.provider());
            }
        }

        let mut results: Vec<(Provider, Result<Resolved, ProviderInstallError>)> = stream::iter(work)
            .map(|(provider, constraints)| {
                let run = &run;
                async move {
                    let prior = locks.provider(&provider);
                    let result = self.install_provider(run, &provider, &constraints, prior, mode).await;
                    if matches!(result, Err(ProviderInstallError::HashMismatch { .. })) {
                        run.cancel();
                    }
                    (provider, result)
                }
            })
            .buffer_unordered(self.max_parallel)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let mut outcome = InstallOutcome::default();
        let mut failures: Vec<(Provider, ProviderInstallError)> = Vec::new();
        for (provider, result) in results {
            match result {
                Ok(resolved) => {
                    outcome.executables.insert(provider.clone(), resolved.cached.executable_file);
                    if outcome.locks.set_provider(resolved.lock).is_err() {
                        failures.push((provider.clone(), ProviderInstallError::Unlockable { provider }));
                    }
                }
                Err(err) => failures.push((provider, err)),
            }
        }
        self.events.finished(outcome.executables.len(), failures.len());

        if let Some((_, ProviderInstallError::HashMismatch { provider, version, platform, expected, actual })) =
            failures.iter().find(|(_, e)| matches!(e, ProviderInstallError::HashMismatch { .. }))
        {
            return Err(InstallerError::HashMismatch {
                provider: provider.clone(),
                version: version.clone(),
                platform: platform.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            });
        }
        if cancel.is_cancelled() || failures.iter().any(|(_, e)| *e == ProviderInstallError::Cancelled) {
            return Err(InstallerError::Cancelled);
        }
        if failures.is_empty() {
            info!(
                target: "provman::installer",
                "{} providers installed for {}",
                outcome.executables.len(),
                self.target.target_platform()
            );
            return Ok(outcome);
        }

        let mut diagnostics = Diagnostics::new();
        for (_, err) in &failures {
            diagnostics.push(err.to_diagnostic());
        }
        match &self.offline_dirs {
            Some(dirs) if failures.iter().all(|(_, e)| e.is_unavailable()) => {
                Err(InstallerError::ProvidersUnavailableOffline {
                    providers: failures.into_iter().map(|(p, _)| p).collect(),
                    dirs: dirs.clone(),
                    diagnostics,
                })
            }
            _ => Err(InstallerError::ProvidersFailed { diagnostics }),
        }
    }

    /// Load the lock file at `lock_path`, install, and write the lock file
    /// back once if anything changed.
    ///
    /// The lock file is left untouched when installation fails or is
    /// cancelled.
    pub async fn install_with_lock_file(
        &self,
        cancel: &CancellationToken,
        lock_path: &Path,
        reqs: &Requirements,
        mode: InstallMode,
    ) -> Result<InstallOutcome, InstallerError> {
        let (locks, mut diagnostics) = Locks::load_with_diagnostics(lock_path)?;
        let mut outcome = self.ensure_provider_versions(cancel, &locks, reqs, mode).await?;
        if cancel.is_cancelled() {
            return Err(InstallerError::Cancelled);
        }

        if outcome.locks.equal(&locks) {
            debug!(target: "provman::installer", "lock file {} unchanged", lock_path.display());
        } else {
            outcome.locks.save(lock_path)?;
            info!(target: "provman::installer", "updated lock file {}", lock_path.display());
        }
        diagnostics.extend(std::mem::take(&mut outcome.diagnostics));
        outcome.diagnostics = diagnostics;
        Ok(outcome)
    }

    async fn install_provider(
        &self,
        cancel: &CancellationToken,
        provider: &Provider,
        constraints: &VersionConstraints,
        prior: Option<&ProviderLock>,
        mode: InstallMode,
    ) -> Result<Resolved, ProviderInstallError> {
        if cancel.is_cancelled() {
            return Err(ProviderInstallError::Cancelled);
        }
        if !is_lockable(provider) {
            return Err(ProviderInstallError::Unlockable {
                provider: provider.clone(),
            });
        }

        let (version, from_lock) = match self.choose_version(cancel, provider, constraints, prior, mode).await {
            Ok(chosen) => chosen,
            Err(err) => {
                self.events.query_failed(provider, constraints, &err);
                return Err(err);
            }
        };
        self.events.selected_version(provider, &version, from_lock);

        let platform = self.target.target_platform().clone();
        let same_version = prior.filter(|lock| lock.version() == &version);
        let allowed: Vec<PackageHash> = same_version
            .and_then(|lock| lock.hashes_for(&platform))
            .map(<[PackageHash]>::to_vec)
            .unwrap_or_default();
        let mut lock = ProviderLock::new(
            provider.clone(),
            version.clone(),
            Some(constraints.clone()),
            same_version.and_then(|lock| lock.hashes().cloned()),
        );

        if let Some(cached) = self.target.provider_version(provider, &version) {
            if let Some(hash) = verify_cached(&cached, &platform, &allowed).await? {
                if from_lock {
                    self.events.provider_already_installed(provider, &version);
                }
                debug!(target: "provman::cache", "using cached {provider} {version}");
                lock.add_hashes(&platform, [hash]);
                return Ok(Resolved { cached, lock });
            }
            debug!(
                target: "provman::installer",
                "cached {provider} {version} cannot be checked against the locked hashes, fetching it again"
            );
        }

        let (installed, meta) = match self.fetch(cancel, provider, &version, &platform, &allowed).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.events.fetch_failure(provider, &version, &err);
                return Err(err);
            }
        };
        self.events.fetch_success(provider, &version, &installed.hash);

        lock.add_hashes(&platform, installed.lock_hashes());
        if let Some(meta) = meta {
            lock.add_hashes(&platform, meta.hashes);
        }
        Ok(Resolved {
            cached: installed.cached,
            lock,
        })
    }

    async fn choose_version(
        &self,
        cancel: &CancellationToken,
        provider: &Provider,
        constraints: &VersionConstraints,
        prior: Option<&ProviderLock>,
        mode: InstallMode,
    ) -> Result<(Version, bool), ProviderInstallError> {
        if mode == InstallMode::NewProvidersOnly
            && let Some(lock) = prior
        {
            if !constraints.allows(lock.version()) {
                return Err(ProviderInstallError::LockedVersionConflict {
                    provider: provider.clone(),
                    locked: lock.version().clone(),
                    constraints: constraints.clone(),
                });
            }
            return Ok((lock.version().clone(), true));
        }

        self.events.querying_available_versions(provider);
        debug!(target: "provman::installer", "querying versions of {provider}");
        let available = cancellable(cancel, self.source.available_versions(provider))
            .await
            .map_err(|e| ProviderInstallError::from_source(provider, e))?;

        let policy = match mode {
            InstallMode::Upgrade => SelectionPolicy::Newest,
            InstallMode::NewProvidersOnly => self.policy,
        };
        let cached: Vec<Version> = self
            .target
            .all_available_packages()
            .remove(provider)
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.version)
            .collect();

        select_version(&available, constraints, &cached, policy)
            .map(|v| (v, false))
            .ok_or_else(|| ProviderInstallError::ConstraintUnsatisfiable {
                provider: provider.clone(),
                constraints: constraints.clone(),
                closest: closest_versions(&available, CLOSEST_VERSIONS_SHOWN),
            })
    }

    /// Bring a package into the target cache, from the global cache when it
    /// has one, otherwise from the source. Returns the source's metadata
    /// when the source was used.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        provider: &Provider,
        version: &Version,
        platform: &Platform,
        allowed: &[PackageHash],
    ) -> Result<(InstalledPackage, Option<PackageMeta>), ProviderInstallError> {
        let cache_err = |e: CacheError| ProviderInstallError::from_cache(provider, version, e);

        if let Some(global) = &self.global_cache
            && let Some(in_global) = global.provider_version(provider, version)
        {
            self.events.linked_from_global_cache(provider, version, &in_global.package_dir);
            let linked = self
                .target
                .link_from_other_cache(cancel, &in_global, allowed)
                .await
                .map_err(cache_err)?;
            return Ok((linked, None));
        }

        let meta = cancellable(cancel, self.source.package_meta(provider, version, platform))
            .await
            .map_err(|e| ProviderInstallError::from_source(provider, e))?;
        self.events.fetch_begin(provider, version, &meta.location);

        let installed = match &self.global_cache {
            Some(global) => {
                let in_global = global.install_package(cancel, &meta, allowed).await.map_err(cache_err)?;
                let linked = self
                    .target
                    .link_from_other_cache(cancel, &in_global.cached, allowed)
                    .await
                    .map_err(cache_err)?;
                InstalledPackage {
                    cached: linked.cached,
                    ..in_global
                }
            }
            None => self.target.install_package(cancel, &meta, allowed).await.map_err(cache_err)?,
        };
        Ok((installed, Some(meta)))
    }
}

/// Check a cached package against locked hashes.
///
/// Returns its `h1:` hash when it can be trusted, `None` when the lock only
/// records archive hashes that an unpacked package cannot be checked
/// against, and a mismatch error otherwise.
async fn verify_cached(
    cached: &CachedProvider,
    platform: &Platform,
    allowed: &[PackageHash],
) -> Result<Option<PackageHash>, ProviderInstallError> {
    let pkg = cached.clone();
    let hash = tokio::task::spawn_blocking(move || pkg.hash())
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()))
        .map_err(|message| ProviderInstallError::CacheWriteFailure {
            provider: cached.provider.clone(),
            message: format!("failed to hash {}: {message}", cached.package_dir.display()),
        })?;

    let checkable: Vec<&PackageHash> = allowed.iter().filter(|h| h.scheme() == HashScheme::V1).collect();
    if allowed.is_empty() || checkable.contains(&&hash) {
        return Ok(Some(hash));
    }
    if checkable.is_empty() {
        return Ok(None);
    }
    Err(ProviderInstallError::HashMismatch {
        provider: cached.provider.clone(),
        version: cached.version.clone(),
        platform: platform.clone(),
        expected: allowed.to_vec(),
        actual: hash,
    })
}
