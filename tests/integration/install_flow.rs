//! Installer runs against real filesystem mirrors and cache directories.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use provman_cli::addrs::Provider;
use provman_cli::cache::CacheDir;
use provman_cli::installer::{InstallMode, Installer, InstallerError, Requirements, parse_requirement};
use provman_cli::lockfile::Locks;
use provman_cli::source::{
    FilesystemMirrorSource, MemoizeSource, MultiSource, MultiSourceSelector, PackageHash, Platform,
    ProviderPattern, Version,
};
use provman_cli::test_utils::PackageFixture;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PLATFORM: &str = "linux_amd64";

fn platform() -> Platform {
    Platform::parse(PLATFORM).unwrap()
}

fn requirements(given: &[&str]) -> Requirements {
    given.iter().map(|g| parse_requirement(g).unwrap()).collect()
}

fn publish(mirror: &Path, provider: &str, versions: &[&str]) -> Result<Vec<PackageFixture>> {
    versions
        .iter()
        .map(|v| {
            let fixture = PackageFixture::new(provider, v, PLATFORM)?;
            fixture.write_packed(mirror)?;
            Ok(fixture)
        })
        .collect()
}

fn mirror_installer(mirror: &Path, cache: &Path) -> Installer {
    Installer::new(
        Arc::new(FilesystemMirrorSource::new(mirror)),
        Arc::new(CacheDir::with_platform(cache, platform())),
    )
}

#[tokio::test]
async fn test_install_then_reuse_without_source() -> Result<()> {
    let temp = TempDir::new()?;
    let mirror = temp.path().join("mirror");
    let cache = temp.path().join("cache");
    let fixtures = publish(&mirror, "hashicorp/null", &["2.0.0", "2.1.0", "3.0.0"])?;
    let reqs = requirements(&["hashicorp/null=>= 2.0.0, < 3.0.0"]);
    let cancel = CancellationToken::new();

    let first = mirror_installer(&mirror, &cache)
        .ensure_provider_versions(&cancel, &Locks::new(), &reqs, InstallMode::NewProvidersOnly)
        .await?;

    let null = Provider::new_default("hashicorp", "null")?;
    let lock = first.locks.provider(&null).expect("null is locked");
    assert_eq!(lock.version(), &Version::new(2, 1, 0));
    let hashes = lock.hashes_for(&platform()).expect("hashes for the target platform");
    assert!(hashes.contains(&fixtures[1].h1_hash()?));
    assert!(hashes.iter().any(|h| h.as_str().starts_with("zh:")));
    assert!(first.executables[&null].is_file());

    // The mirror is gone; a locked and cached provider must not need it.
    std::fs::remove_dir_all(&mirror)?;
    let second = mirror_installer(&mirror, &cache)
        .ensure_provider_versions(&cancel, &first.locks, &reqs, InstallMode::NewProvidersOnly)
        .await?;
    assert!(second.locks.equal(&first.locks));
    assert_eq!(second.executables, first.executables);
    Ok(())
}

#[tokio::test]
async fn test_lock_file_is_byte_identical_across_projects() -> Result<()> {
    let temp = TempDir::new()?;
    let mirror = temp.path().join("mirror");
    publish(&mirror, "hashicorp/null", &["1.0.0", "1.1.0"])?;
    publish(&mirror, "hashicorp/random", &["3.4.0"])?;
    publish(&mirror, "example.com/acme/widget", &["0.2.0"])?;
    let reqs = requirements(&["hashicorp/random", "example.com/acme/widget", "hashicorp/null=~> 1.0"]);
    let cancel = CancellationToken::new();

    let mut written = Vec::new();
    for project in ["a", "b"] {
        let dir = temp.path().join(project);
        let lock_path = dir.join(".provman.lock.hcl");
        std::fs::create_dir_all(&dir)?;
        mirror_installer(&mirror, &dir.join("cache"))
            .install_with_lock_file(&cancel, &lock_path, &reqs, InstallMode::NewProvidersOnly)
            .await?;
        written.push(std::fs::read_to_string(&lock_path)?);
    }
    assert_eq!(written[0], written[1]);

    // providers appear in address order
    let example = written[0].find("example.com/acme/widget").unwrap();
    let null = written[0].find("registry.terraform.io/hashicorp/null").unwrap();
    let random = written[0].find("registry.terraform.io/hashicorp/random").unwrap();
    assert!(example < null && null < random);
    Ok(())
}

#[tokio::test]
async fn test_offline_reports_exactly_the_missing_providers() -> Result<()> {
    let temp = TempDir::new()?;
    let plugins = temp.path().join("plugins");
    publish(&plugins, "hashicorp/null", &["2.1.0"])?;
    let reqs = requirements(&["hashicorp/null", "hashicorp/random", "example.com/acme/widget"]);

    let installer = Installer::from_plugin_dirs(
        vec![plugins.clone()],
        Arc::new(CacheDir::with_platform(temp.path().join("cache"), platform())),
    );
    let err = installer
        .ensure_provider_versions(&CancellationToken::new(), &Locks::new(), &reqs, InstallMode::NewProvidersOnly)
        .await
        .unwrap_err();

    match err {
        InstallerError::ProvidersUnavailableOffline {
            providers,
            dirs,
            ..
        } => {
            let names: Vec<String> = providers.iter().map(ToString::to_string).collect();
            assert_eq!(names, vec!["example.com/acme/widget", "registry.terraform.io/hashicorp/random"]);
            assert_eq!(dirs, vec![plugins]);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_multi_source_routes_by_pattern() -> Result<()> {
    let temp = TempDir::new()?;
    let public = temp.path().join("public");
    let private = temp.path().join("private");
    publish(&public, "hashicorp/null", &["2.1.0"])?;
    // a decoy in the public mirror that must never be chosen
    publish(&public, "example.com/acme/widget", &["9.9.9"])?;
    publish(&private, "example.com/acme/widget", &["0.2.0"])?;

    let source = MultiSource::new(vec![
        MultiSourceSelector::new(Arc::new(MemoizeSource::new(FilesystemMirrorSource::new(&private))))
            .with_include(vec![ProviderPattern::parse("example.com/*/*")?]),
        MultiSourceSelector::new(Arc::new(MemoizeSource::new(FilesystemMirrorSource::new(&public))))
            .with_exclude(vec![ProviderPattern::parse("example.com/*/*")?]),
    ]);
    let installer = Installer::new(
        Arc::new(source),
        Arc::new(CacheDir::with_platform(temp.path().join("cache"), platform())),
    );

    let outcome = installer
        .ensure_provider_versions(
            &CancellationToken::new(),
            &Locks::new(),
            &requirements(&["hashicorp/null", "example.com/acme/widget"]),
            InstallMode::NewProvidersOnly,
        )
        .await?;

    let widget: Provider = "example.com/acme/widget".parse()?;
    assert_eq!(outcome.locks.provider(&widget).unwrap().version(), &Version::new(0, 2, 0));
    assert_eq!(outcome.executables.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_locked_hash_mismatch_preserves_lock_and_cache() -> Result<()> {
    let temp = TempDir::new()?;
    let mirror = temp.path().join("mirror");
    let cache = temp.path().join("cache");
    let lock_path = temp.path().join(".provman.lock.hcl");
    publish(&mirror, "hashicorp/null", &["2.1.0"])?;

    let lock_text = format!(
        "provider \"registry.terraform.io/hashicorp/null\" {{\n  version = \"2.1.0\"\n\n  hashes {{\n    {PLATFORM} = [\n      \"h1:bm90IHRoZSByaWdodCBoYXNo\",\n    ]\n  }}\n}}\n"
    );
    std::fs::write(&lock_path, &lock_text)?;

    let err = mirror_installer(&mirror, &cache)
        .install_with_lock_file(
            &CancellationToken::new(),
            &lock_path,
            &requirements(&["hashicorp/null"]),
            InstallMode::NewProvidersOnly,
        )
        .await
        .unwrap_err();

    match err {
        InstallerError::HashMismatch {
            expected,
            ..
        } => assert_eq!(expected, vec![PackageHash::new("h1:bm90IHRoZSByaWdodCBoYXNo")]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(std::fs::read_to_string(&lock_path)?, lock_text);
    let cache_dir = CacheDir::with_platform(&cache, platform());
    assert!(cache_dir.all_available_packages().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_upgrade_moves_to_newest_and_keeps_old_cache() -> Result<()> {
    let temp = TempDir::new()?;
    let mirror = temp.path().join("mirror");
    let cache = temp.path().join("cache");
    let lock_path = temp.path().join(".provman.lock.hcl");
    let cancel = CancellationToken::new();
    publish(&mirror, "hashicorp/null", &["2.0.0"])?;

    let reqs = requirements(&["hashicorp/null=>= 2.0.0"]);
    mirror_installer(&mirror, &cache)
        .install_with_lock_file(&cancel, &lock_path, &reqs, InstallMode::NewProvidersOnly)
        .await?;

    publish(&mirror, "hashicorp/null", &["2.2.0"])?;
    let kept = mirror_installer(&mirror, &cache)
        .install_with_lock_file(&cancel, &lock_path, &reqs, InstallMode::NewProvidersOnly)
        .await?;
    let null = Provider::new_default("hashicorp", "null")?;
    assert_eq!(kept.locks.provider(&null).unwrap().version(), &Version::new(2, 0, 0));

    let upgraded = mirror_installer(&mirror, &cache)
        .install_with_lock_file(&cancel, &lock_path, &reqs, InstallMode::Upgrade)
        .await?;
    assert_eq!(upgraded.locks.provider(&null).unwrap().version(), &Version::new(2, 2, 0));
    assert!(std::fs::read_to_string(&lock_path)?.contains("\"2.2.0\""));

    let cached = CacheDir::with_platform(&cache, platform()).all_available_packages();
    let versions: Vec<&Version> = cached[&null].iter().map(|c| &c.version).collect();
    assert_eq!(versions, vec![&Version::new(2, 0, 0), &Version::new(2, 2, 0)]);
    Ok(())
}
