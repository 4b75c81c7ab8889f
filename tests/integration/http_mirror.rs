//! Installing providers from a network mirror.

use std::sync::Arc;

use anyhow::Result;
use httpmock::prelude::*;
use provman_cli::addrs::Provider;
use provman_cli::cache::CacheDir;
use provman_cli::installer::{InstallMode, Installer, InstallerError, Requirements, parse_requirement};
use provman_cli::lockfile::Locks;
use provman_cli::source::hash::package_hash_legacy_zip;
use provman_cli::source::{HttpMirrorSource, MemoizeSource, Platform, Version};
use provman_cli::test_utils::PackageFixture;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PLATFORM: &str = "linux_arm64";
const BASE: &str = "/registry.terraform.io/hashicorp/null";

fn installer(server: &MockServer, cache: &std::path::Path) -> Result<Installer> {
    let source = MemoizeSource::new(HttpMirrorSource::new(&server.url("/"))?);
    Ok(Installer::new(
        Arc::new(source),
        Arc::new(CacheDir::with_platform(cache, Platform::parse(PLATFORM)?)),
    ))
}

fn requirements(given: &str) -> Requirements {
    [parse_requirement(given).unwrap()].into_iter().collect()
}

#[tokio::test]
async fn test_install_from_network_mirror() -> Result<()> {
    let temp = TempDir::new()?;
    let fixture = PackageFixture::new("hashicorp/null", "2.1.0", PLATFORM)?;
    let archive = fixture.write_archive_at(&temp.path().join(fixture.archive_filename()))?;
    let zh = package_hash_legacy_zip(&archive)?;

    let server = MockServer::start_async().await;
    let index = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{BASE}/index.json"));
            then.status(200).json_body(json!({"versions": {"2.0.0": {}, "2.1.0": {}, "3.0.0": {}}}));
        })
        .await;
    let version_doc = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{BASE}/2.1.0.json"));
            then.status(200).json_body(json!({
                "archives": {
                    PLATFORM: {
                        "url": fixture.archive_filename(),
                        "hashes": [zh.as_str()]
                    }
                }
            }));
        })
        .await;
    let download = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{BASE}/{}", fixture.archive_filename()));
            then.status(200).body(std::fs::read(&archive).unwrap());
        })
        .await;

    let outcome = installer(&server, &temp.path().join("cache"))?
        .ensure_provider_versions(
            &CancellationToken::new(),
            &Locks::new(),
            &requirements("hashicorp/null=< 3.0.0"),
            InstallMode::NewProvidersOnly,
        )
        .await?;

    let null = Provider::new_default("hashicorp", "null")?;
    let lock = outcome.locks.provider(&null).unwrap();
    assert_eq!(lock.version(), &Version::new(2, 1, 0));
    let hashes = lock.hashes_for(&Platform::parse(PLATFORM)?).unwrap();
    assert!(hashes.contains(&zh));
    assert!(hashes.contains(&fixture.h1_hash()?));
    assert_eq!(std::fs::read_to_string(&outcome.executables[&null])?, fixture.content);

    index.assert_hits_async(1).await;
    version_doc.assert_hits_async(1).await;
    download.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn test_unsatisfiable_constraints_report_closest_versions() -> Result<()> {
    let temp = TempDir::new()?;
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{BASE}/index.json"));
            then.status(200).json_body(json!({"versions": {"1.0.0": {}, "1.1.0": {}, "1.2.0": {}, "1.3.0": {}}}));
        })
        .await;

    let err = installer(&server, &temp.path().join("cache"))?
        .ensure_provider_versions(
            &CancellationToken::new(),
            &Locks::new(),
            &requirements("hashicorp/null=>= 2.0.0"),
            InstallMode::NewProvidersOnly,
        )
        .await
        .unwrap_err();

    match err {
        InstallerError::ProvidersFailed {
            diagnostics,
        } => {
            let diag = diagnostics.errors().next().unwrap();
            assert!(diag.detail.contains(">= 2.0.0"), "{}", diag.detail);
            assert!(diag.detail.contains("1.3.0"), "{}", diag.detail);
            assert!(!diag.detail.contains("1.0.0"), "{}", diag.detail);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_provider_fails() -> Result<()> {
    let temp = TempDir::new()?;
    let server = MockServer::start_async().await;

    let err = installer(&server, &temp.path().join("cache"))?
        .ensure_provider_versions(
            &CancellationToken::new(),
            &Locks::new(),
            &requirements("hashicorp/null"),
            InstallMode::NewProvidersOnly,
        )
        .await
        .unwrap_err();

    // not offline, so this is an ordinary failure
    assert!(matches!(err, InstallerError::ProvidersFailed { .. }));
    Ok(())
}
