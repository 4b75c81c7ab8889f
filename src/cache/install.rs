use std::fs::File;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::lock::{CacheLock, package_lock_key};
use super::{CacheDir, CacheError, CachedProvider, STAGING_DIR, package_dir_in};
use crate::source::hash::{
    HashScheme, PackageHash, package_hash_legacy_zip, package_hash_v1_dir,
};
use crate::source::{PackageLocation, PackageMeta};
use crate::utils::fs::{copy_dir, ensure_dir, remove_dir_all};

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub cached: CachedProvider,
    /// `h1:` hash of the installed contents.
    pub hash: PackageHash,
    /// `zh:` hash of the archive it came from, when installed from one.
    pub archive_hash: Option<PackageHash>,
}

impl InstalledPackage {
    /// Hashes worth recording in a lock file for this package.
    #[must_use]
    pub fn lock_hashes(&self) -> Vec<PackageHash> {
        let mut hashes = vec![self.hash.clone()];
        hashes.extend(self.archive_hash.clone());
        hashes
    }
}

fn verifiable(hash: &PackageHash, packed: bool) -> bool {
    match hash.scheme() {
        HashScheme::V1 => true,
        HashScheme::LegacyZip => packed,
        HashScheme::Unknown => false,
    }
}

/// Fail unless one of `expected` matches the staged package.
///
/// Hashes that cannot be checked against this kind of package (a `zh:` hash
/// for an unpacked directory, unknown schemes) are skipped. If that leaves
/// nothing to check, a `strict` list still fails while a non-strict one
/// passes: a lock file that recorded only uncheckable hashes cannot vouch
/// for the package, whereas an origin that offered none simply did not
/// authenticate it.
fn check_hashes(
    meta: &PackageMeta,
    expected: &[PackageHash],
    strict: bool,
    packed: bool,
    hash: &PackageHash,
    archive_hash: Option<&PackageHash>,
) -> Result<(), CacheError> {
    if expected.is_empty() {
        return Ok(());
    }
    let checkable: Vec<&PackageHash> = expected.iter().filter(|h| verifiable(h, packed)).collect();
    if checkable.is_empty() && !strict {
        return Ok(());
    }
    let matched = checkable.contains(&hash) || archive_hash.is_some_and(|zh| checkable.contains(&zh));
    if matched {
        return Ok(());
    }
    Err(CacheError::HashMismatch {
        provider: meta.provider.clone(),
        version: meta.version.clone(),
        platform: meta.target_platform.clone(),
        expected: expected.to_vec(),
        actual: hash.clone(),
    })
}

async fn blocking<T, F>(path: &Path, f: F) -> Result<T, CacheError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::write(path, e))?
        .map_err(|e| CacheError::write(path, format!("{e:#}")))
}

async fn download(
    cache: &CacheDir,
    cancel: &CancellationToken,
    url: &str,
    dest: &Path,
) -> Result<(), CacheError> {
    let failed = |message: String| CacheError::Download {
        url: url.to_string(),
        message,
    };

    debug!(target: "provman::cache", "downloading {url}");
    let response = tokio::select! {
        () = cancel.cancelled() => return Err(CacheError::Cancelled),
        r = cache.http().get(url).send() => r.map_err(|e| failed(e.to_string()))?,
    };
    let response = response.error_for_status().map_err(|e| failed(e.to_string()))?;
    let body = tokio::select! {
        () = cancel.cancelled() => return Err(CacheError::Cancelled),
        r = response.bytes() => r.map_err(|e| failed(e.to_string()))?,
    };
    tokio::fs::write(dest, &body).await.map_err(|e| CacheError::write(dest, e))
}

pub(super) async fn install_package(
    cache: &CacheDir,
    cancel: &CancellationToken,
    meta: &PackageMeta,
    allowed_hashes: &[PackageHash],
) -> Result<InstalledPackage, CacheError> {
    if cancel.is_cancelled() {
        return Err(CacheError::Cancelled);
    }

    let base = cache.base_dir();
    let key = package_lock_key(&meta.provider, &meta.version, &meta.target_platform);
    let _lock = tokio::select! {
        () = cancel.cancelled() => return Err(CacheError::Cancelled),
        lock = CacheLock::acquire(base, &key) => lock.map_err(|e| CacheError::write(base, format!("{e:#}")))?,
    };

    let staging_root = base.join(STAGING_DIR);
    ensure_dir(&staging_root).map_err(|e| CacheError::write(&staging_root, format!("{e:#}")))?;
    let staging = tempfile::Builder::new()
        .prefix(".install-")
        .tempdir_in(&staging_root)
        .map_err(|e| CacheError::write(&staging_root, e))?;
    let unpacked = staging.path().join("package");

    let archive: Option<PathBuf> = match &meta.location {
        PackageLocation::HttpUrl(url) => {
            let dest = staging.path().join(&meta.filename);
            download(cache, cancel, url, &dest).await?;
            Some(dest)
        }
        PackageLocation::LocalArchive(path) => {
            if !path.is_file() {
                return Err(CacheError::InvalidPackage {
                    location: path.display().to_string(),
                    reason: "archive does not exist".to_string(),
                });
            }
            Some(path.clone())
        }
        PackageLocation::LocalDir(src) => {
            if !src.is_dir() {
                return Err(CacheError::InvalidPackage {
                    location: src.display().to_string(),
                    reason: "package directory does not exist".to_string(),
                });
            }
            let (src, dst) = (src.clone(), unpacked.clone());
            blocking(&unpacked, move || copy_dir(&src, &dst)).await?;
            None
        }
    };

    if cancel.is_cancelled() {
        return Err(CacheError::Cancelled);
    }

    let mut archive_hash = None;
    if let Some(archive) = &archive {
        let (src, dst) = (archive.clone(), unpacked.clone());
        let location = meta.location.to_string();
        let zh = tokio::task::spawn_blocking(move || -> Result<PackageHash, CacheError> {
            let invalid = |reason: String| CacheError::InvalidPackage {
                location: location.clone(),
                reason,
            };
            let zh = package_hash_legacy_zip(&src).map_err(|e| invalid(e.to_string()))?;
            let file = File::open(&src).map_err(|e| invalid(e.to_string()))?;
            let mut zip = zip::ZipArchive::new(file).map_err(|e| invalid(e.to_string()))?;
            zip.extract(&dst).map_err(|e| invalid(e.to_string()))?;
            Ok(zh)
        })
        .await
        .map_err(|e| CacheError::write(&unpacked, e))??;
        archive_hash = Some(zh);
    }

    let dir = unpacked.clone();
    let hash = blocking(&unpacked, move || Ok(package_hash_v1_dir(&dir)?)).await?;

    check_hashes(meta, &meta.hashes, false, archive.is_some(), &hash, archive_hash.as_ref())?;
    check_hashes(meta, allowed_hashes, true, archive.is_some(), &hash, archive_hash.as_ref())?;

    let target = package_dir_in(cache.base_dir(), &meta.provider, &meta.version, &meta.target_platform);
    let (existing, expected) = (target.clone(), hash.clone());
    let identical = blocking(&target, move || {
        Ok(existing.is_dir() && package_hash_v1_dir(&existing)? == expected)
    })
    .await?;

    if identical {
        debug!(target: "provman::cache", "{} {} already installed with identical content", meta.provider, meta.version);
    } else {
        let (staged, dest) = (unpacked.clone(), target.clone());
        blocking(&target, move || {
            if let Some(parent) = dest.parent() {
                ensure_dir(parent)?;
            }
            remove_dir_all(&dest)?;
            std::fs::rename(&staged, &dest)?;
            Ok(())
        })
        .await?;
        info!(target: "provman::cache", "installed {} {} ({})", meta.provider, meta.version, meta.target_platform);
    }

    Ok(InstalledPackage {
        cached: CachedProvider::from_package_dir(
            meta.provider.clone(),
            meta.version.clone(),
            &meta.target_platform,
            target,
        ),
        hash,
        archive_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Platform;
    use crate::test_utils::PackageFixture;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Setup {
        _temp: TempDir,
        cache: CacheDir,
        origin: PathBuf,
    }

    fn setup() -> Setup {
        let temp = TempDir::new().unwrap();
        let cache = CacheDir::with_platform(temp.path().join("cache"), Platform::new("linux", "amd64"));
        let origin = temp.path().join("origin");
        Setup {
            _temp: temp,
            cache,
            origin,
        }
    }

    fn null(content: &str) -> PackageFixture {
        PackageFixture::new("hashicorp/null", "2.1.0", "linux_amd64").unwrap().with_content(content)
    }

    fn archive_meta(setup: &Setup, fixture: &PackageFixture) -> PackageMeta {
        let archive = fixture.write_archive_at(&setup.origin.join(fixture.archive_filename())).unwrap();
        fixture.archive_meta(&archive)
    }

    fn staging_is_empty(cache: &CacheDir) -> bool {
        let staging = cache.base_dir().join(STAGING_DIR);
        !staging.exists() || std::fs::read_dir(staging).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_install_from_archive() {
        let setup = setup();
        let fixture = null("v1");
        let meta = archive_meta(&setup, &fixture);

        let installed = setup.cache.install_package(&CancellationToken::new(), &meta, &[]).await.unwrap();
        assert_eq!(installed.hash, fixture.h1_hash().unwrap());
        assert!(installed.archive_hash.as_ref().is_some_and(|h| h.to_string().starts_with("zh:")));
        assert_eq!(installed.lock_hashes().len(), 2);
        assert_eq!(std::fs::read_to_string(&installed.cached.executable_file).unwrap(), "v1");
        assert!(staging_is_empty(&setup.cache));
        assert!(setup.cache.provider_version(&fixture.provider, &fixture.version).is_some());
    }

    #[tokio::test]
    async fn test_install_twice_is_idempotent() {
        let setup = setup();
        let fixture = null("v1");
        let meta = archive_meta(&setup, &fixture);
        let cancel = CancellationToken::new();

        let first = setup.cache.install_package(&cancel, &meta, &[]).await.unwrap();
        let second = setup.cache.install_package(&cancel, &meta, &[]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(setup.cache.all_available_packages()[&fixture.provider].len(), 1);
        assert!(staging_is_empty(&setup.cache));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_identical_content_keeps_existing_dir() {
        use std::os::unix::fs::MetadataExt;

        let setup = setup();
        let fixture = null("v1");
        let meta = archive_meta(&setup, &fixture);
        let cancel = CancellationToken::new();

        let first = setup.cache.install_package(&cancel, &meta, &[]).await.unwrap();
        let inode = std::fs::metadata(&first.cached.package_dir).unwrap().ino();
        setup.cache.install_package(&cancel, &meta, &[]).await.unwrap();
        assert_eq!(std::fs::metadata(&first.cached.package_dir).unwrap().ino(), inode);
    }

    #[tokio::test]
    async fn test_differing_content_replaces_existing_dir() {
        let setup = setup();
        let cancel = CancellationToken::new();
        setup.cache.install_package(&cancel, &archive_meta(&setup, &null("v1")), &[]).await.unwrap();

        let replaced = setup.cache.install_package(&cancel, &archive_meta(&setup, &null("v2")), &[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&replaced.cached.executable_file).unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_allowed_hash_mismatch_leaves_target_untouched() {
        let setup = setup();
        let cancel = CancellationToken::new();
        let original = null("v1");
        let installed = setup.cache.install_package(&cancel, &archive_meta(&setup, &original), &[]).await.unwrap();

        let tampered = null("tampered");
        let err = setup
            .cache
            .install_package(&cancel, &archive_meta(&setup, &tampered), &[original.h1_hash().unwrap()])
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::HashMismatch { .. }));
        assert_eq!(std::fs::read_to_string(&installed.cached.executable_file).unwrap(), "v1");
        assert!(staging_is_empty(&setup.cache));
    }

    #[tokio::test]
    async fn test_origin_hash_mismatch_installs_nothing() {
        let setup = setup();
        let fixture = null("v1");
        let mut meta = archive_meta(&setup, &fixture);
        meta.hashes = vec![null("other").h1_hash().unwrap()];

        let err = setup.cache.install_package(&CancellationToken::new(), &meta, &[]).await.unwrap_err();
        assert!(matches!(err, CacheError::HashMismatch { .. }));
        assert!(setup.cache.provider_version(&fixture.provider, &fixture.version).is_none());
    }

    #[tokio::test]
    async fn test_install_from_local_dir() {
        let setup = setup();
        let fixture = null("unpacked");
        let src = fixture.write_unpacked(&setup.origin).unwrap();
        let meta = PackageMeta {
            location: PackageLocation::LocalDir(src),
            ..fixture.archive_meta(Path::new("unused.zip"))
        };

        let installed = setup.cache.install_package(&CancellationToken::new(), &meta, &[]).await.unwrap();
        assert_eq!(installed.hash, fixture.h1_hash().unwrap());
        assert!(installed.archive_hash.is_none());
        assert_eq!(std::fs::read_to_string(&installed.cached.executable_file).unwrap(), "unpacked");
    }

    #[tokio::test]
    async fn test_missing_archive_is_invalid() {
        let setup = setup();
        let meta = null("v1").archive_meta(&setup.origin.join("missing.zip"));
        let err = setup.cache.install_package(&CancellationToken::new(), &meta, &[]).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidPackage { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let setup = setup();
        let fixture = null("v1");
        let meta = archive_meta(&setup, &fixture);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = setup.cache.install_package(&cancel, &meta, &[]).await.unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
        assert!(setup.cache.provider_version(&fixture.provider, &fixture.version).is_none());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_package_lock() {
        let setup = setup();
        let fixture = null("v1");
        let meta = archive_meta(&setup, &fixture);
        let key = package_lock_key(&fixture.provider, &fixture.version, &fixture.platform);
        let _held = CacheLock::acquire(setup.cache.base_dir(), &key).await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result =
            tokio::time::timeout(Duration::from_secs(5), setup.cache.install_package(&cancel, &meta, &[])).await;
        assert!(matches!(result, Ok(Err(CacheError::Cancelled))));
        assert!(setup.cache.provider_version(&fixture.provider, &fixture.version).is_none());
    }
}
