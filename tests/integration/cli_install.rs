//! `provman install` end to end.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;

use crate::common::TestProject;

#[test]
fn test_help_lists_commands() -> Result<()> {
    Command::cargo_bin("provman")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install").and(predicate::str::contains("cache")));
    Ok(())
}

#[test]
fn test_install_from_plugin_dir() -> Result<()> {
    let project = TestProject::new()?;
    project.add_mirror_package("hashicorp/null", "2.0.0")?;
    project.add_mirror_package("hashicorp/null", "2.1.0")?;
    let mirror = project.mirror_path().display().to_string();

    project
        .run_provman(&["install", "--plugin-dir", &mirror, "--require", "hashicorp/null=>= 2.0.0"])?
        .assert_success()
        .assert_stdout_contains("registry.terraform.io/hashicorp/null 2.1.0");

    let lock = project.read_lock()?;
    assert!(lock.contains("provider \"registry.terraform.io/hashicorp/null\" {"));
    assert!(lock.contains("version     = \"2.1.0\""));
    assert!(lock.contains("constraints = \">= 2.0.0\""));
    assert!(lock.contains("\"h1:"));
    Ok(())
}

#[test]
fn test_reinstall_from_lock_without_requirements() -> Result<()> {
    let project = TestProject::new()?;
    project.add_mirror_package("hashicorp/null", "2.1.0")?;
    let mirror = project.mirror_path().display().to_string();

    project.run_provman(&["install", "--plugin-dir", &mirror, "--require", "hashicorp/null"])?.assert_success();
    let first = project.read_lock()?;

    // a newer release appears, but the lock keeps the selection
    project.add_mirror_package("hashicorp/null", "2.2.0")?;
    project
        .run_provman(&["install", "--plugin-dir", &mirror])?
        .assert_success()
        .assert_stdout_contains("2.1.0");
    assert_eq!(project.read_lock()?, first);

    project.run_provman(&["install", "--plugin-dir", &mirror, "--upgrade"])?.assert_success();
    assert!(project.read_lock()?.contains("\"2.2.0\""));
    Ok(())
}

#[test]
fn test_install_with_settings_file() -> Result<()> {
    let project = TestProject::new()?;
    project.add_mirror_package("example.com/acme/widget", "0.3.1")?;
    let mirror = project.mirror_path().display().to_string().replace('\\', "/");
    project.write_config(&format!(
        "[[provider_installation]]\nfilesystem_mirror = \"{mirror}\"\ninclude = [\"example.com/*/*\"]\n"
    ))?;

    project
        .run_provman(&["install", "--require", "example.com/acme/widget"])?
        .assert_success()
        .assert_stdout_contains("example.com/acme/widget 0.3.1");
    assert!(project.cache_path().join("example.com").join("acme").join("widget").join("0.3.1").is_dir());
    Ok(())
}

#[test]
fn test_missing_provider_offline() -> Result<()> {
    let project = TestProject::new()?;
    project.add_mirror_package("hashicorp/null", "2.1.0")?;
    let mirror = project.mirror_path().display().to_string();

    project
        .run_provman(&["install", "--plugin-dir", &mirror, "--require", "hashicorp/null", "--require", "hashicorp/random"])?
        .assert_failure()
        .assert_stderr_contains("registry.terraform.io/hashicorp/random")
        .assert_stderr_contains("plugin directories");
    assert!(!project.lock_path().exists());
    Ok(())
}

#[test]
fn test_invalid_requirement() -> Result<()> {
    let project = TestProject::new()?;
    project
        .run_provman(&["install", "--require", "a/b/c/d=1.0.0"])?
        .assert_failure()
        .assert_stderr_contains("Invalid requirement")
        .assert_stderr_contains("ADDR=CONSTRAINTS");
    Ok(())
}

#[test]
fn test_malformed_lock_file() -> Result<()> {
    let project = TestProject::new()?;
    project.add_mirror_package("hashicorp/null", "2.1.0")?;
    let mirror = project.mirror_path().display().to_string();
    let malformed = "provider \"hashicorp/null\" {\n  version = \"2.1.0\"\n}\n";
    project.write_lock(malformed)?;

    project
        .run_provman(&["install", "--plugin-dir", &mirror, "--require", "hashicorp/null"])?
        .assert_failure()
        .assert_stderr_contains("Invalid lock file")
        .assert_stderr_contains("Non-normalized provider source address");
    assert_eq!(project.read_lock()?, malformed);
    Ok(())
}

#[test]
fn test_quiet_prints_nothing_on_success() -> Result<()> {
    let project = TestProject::new()?;
    project.add_mirror_package("hashicorp/null", "2.1.0")?;
    let mirror = project.mirror_path().display().to_string();

    let mut cmd = Command::from_std(project.command());
    cmd.args(["--quiet", "install", "--plugin-dir", &mirror, "--require", "hashicorp/null"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    Ok(())
}
