//! Lock file handling across installer runs.

use std::sync::Arc;

use anyhow::Result;
use provman_cli::cache::CacheDir;
use provman_cli::core::diagnostics::Severity;
use provman_cli::installer::{InstallMode, Installer, InstallerError, Requirements, parse_requirement};
use provman_cli::lockfile::{LockFileError, Locks, decode_locks, encode_locks};
use provman_cli::source::{FilesystemMirrorSource, Platform};
use provman_cli::test_utils::PackageFixture;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PLATFORM: &str = "darwin_arm64";

struct Setup {
    _temp: TempDir,
    installer: Installer,
    lock_path: std::path::PathBuf,
}

fn setup() -> Result<Setup> {
    let temp = TempDir::new()?;
    let mirror = temp.path().join("mirror");
    PackageFixture::new("hashicorp/null", "2.1.0", PLATFORM)?.write_packed(&mirror)?;
    let installer = Installer::new(
        Arc::new(FilesystemMirrorSource::new(&mirror)),
        Arc::new(CacheDir::with_platform(temp.path().join("cache"), Platform::parse(PLATFORM)?)),
    );
    let lock_path = temp.path().join(".provman.lock.hcl");
    Ok(Setup {
        _temp: temp,
        installer,
        lock_path,
    })
}

fn null_requirement() -> Requirements {
    [parse_requirement("hashicorp/null").unwrap()].into_iter().collect()
}

#[tokio::test]
async fn test_missing_lock_file_is_created_once() -> Result<()> {
    let s = setup()?;
    assert!(!s.lock_path.exists());

    let outcome = s
        .installer
        .install_with_lock_file(&CancellationToken::new(), &s.lock_path, &null_requirement(), InstallMode::NewProvidersOnly)
        .await?;

    let text = std::fs::read_to_string(&s.lock_path)?;
    assert!(text.starts_with("# This file is maintained automatically by \"provman install\".\n"));
    let (reread, diags) = decode_locks(&text);
    assert!(diags.is_empty(), "{diags}");
    assert!(reread.equal(&outcome.locks));
    assert_eq!(encode_locks(&reread), text);
    Ok(())
}

#[tokio::test]
async fn test_malformed_lock_file_is_rejected_and_untouched() -> Result<()> {
    let s = setup()?;
    let malformed = "provider \"registry.terraform.io/hashicorp/null\" {\n  version = \"two\"\n}\n";
    std::fs::write(&s.lock_path, malformed)?;

    let err = s
        .installer
        .install_with_lock_file(&CancellationToken::new(), &s.lock_path, &null_requirement(), InstallMode::NewProvidersOnly)
        .await
        .unwrap_err();

    match err {
        InstallerError::LockFile(LockFileError::MalformedLockFile {
            diagnostics,
            ..
        }) => {
            let summaries: Vec<&str> = diagnostics.errors().map(|d| d.summary.as_str()).collect();
            assert_eq!(summaries, vec!["Invalid provider version number"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(std::fs::read_to_string(&s.lock_path)?, malformed);
    Ok(())
}

#[tokio::test]
async fn test_unsupported_blocks_are_warnings() -> Result<()> {
    let s = setup()?;
    std::fs::write(
        &s.lock_path,
        "module \"network\" {\n  version = \"1.0.0\"\n}\n\nmodule \"storage\" {\n  version = \"1.0.0\"\n}\n",
    )?;

    let outcome = s
        .installer
        .install_with_lock_file(&CancellationToken::new(), &s.lock_path, &null_requirement(), InstallMode::NewProvidersOnly)
        .await?;

    let warnings: Vec<_> = outcome.diagnostics.iter().filter(|d| d.severity == Severity::Warning).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].summary, "Dependency locks for modules are not yet supported");

    // the rewritten file keeps only what the crate understands
    let text = std::fs::read_to_string(&s.lock_path)?;
    assert!(!text.contains("module"));
    assert!(text.contains("provider \"registry.terraform.io/hashicorp/null\""));
    Ok(())
}

#[tokio::test]
async fn test_unchanged_locks_leave_file_alone() -> Result<()> {
    let s = setup()?;
    let cancel = CancellationToken::new();
    let reqs = null_requirement();
    s.installer
        .install_with_lock_file(&cancel, &s.lock_path, &reqs, InstallMode::NewProvidersOnly)
        .await?;

    // a hand-edited comment survives because nothing needs rewriting
    let mut text = std::fs::read_to_string(&s.lock_path)?;
    text.push_str("# reviewed\n");
    std::fs::write(&s.lock_path, &text)?;

    s.installer
        .install_with_lock_file(&cancel, &s.lock_path, &reqs, InstallMode::NewProvidersOnly)
        .await?;
    assert_eq!(std::fs::read_to_string(&s.lock_path)?, text);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() -> Result<()> {
    let s = setup()?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = s
        .installer
        .install_with_lock_file(&cancel, &s.lock_path, &null_requirement(), InstallMode::NewProvidersOnly)
        .await
        .unwrap_err();
    assert!(matches!(err, InstallerError::Cancelled));
    assert!(!s.lock_path.exists());
    assert!(Locks::load(&s.lock_path)?.is_empty());
    Ok(())
}
