//! Shared helpers for the integration suite.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use provman_cli::source::Platform;
use provman_cli::test_utils::PackageFixture;
use tempfile::TempDir;

/// A scratch project with its own cache directory, a local mirror and an
/// isolated home directory.
pub struct TestProject {
    _temp_dir: TempDir, // Keep alive for RAII cleanup
    project_dir: PathBuf,
    cache_dir: PathBuf,
    mirror_dir: PathBuf,
    home_dir: PathBuf,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let project_dir = temp_dir.path().join("project");
        let cache_dir = temp_dir.path().join("cache");
        let mirror_dir = temp_dir.path().join("mirror");
        let home_dir = temp_dir.path().join("home");

        fs::create_dir_all(&project_dir)?;
        fs::create_dir_all(&mirror_dir)?;
        fs::create_dir_all(&home_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            project_dir,
            cache_dir,
            mirror_dir,
            home_dir,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_dir
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_dir
    }

    pub fn mirror_path(&self) -> &Path {
        &self.mirror_dir
    }

    pub fn lock_path(&self) -> PathBuf {
        self.project_dir.join(".provman.lock.hcl")
    }

    pub fn config_path(&self) -> PathBuf {
        self.home_dir.join("provman.toml")
    }

    /// Publish a package for the host platform in the local mirror.
    pub fn add_mirror_package(&self, provider: &str, version: &str) -> Result<PackageFixture> {
        let fixture = PackageFixture::new(provider, version, &Platform::current().to_string())?;
        fixture.write_packed(&self.mirror_dir)?;
        Ok(fixture)
    }

    pub fn write_config(&self, content: &str) -> Result<()> {
        fs::write(self.config_path(), content).context("Failed to write settings")
    }

    pub fn write_lock(&self, content: &str) -> Result<()> {
        fs::write(self.lock_path(), content).context("Failed to write lock file")
    }

    pub fn read_lock(&self) -> Result<String> {
        fs::read_to_string(self.lock_path()).context("Failed to read lock file")
    }

    /// A `provman` command running in the project directory with the
    /// test's cache, settings and home directory.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_provman"));
        cmd.current_dir(&self.project_dir)
            .env("PROVMAN_CACHE_DIR", &self.cache_dir)
            .env("PROVMAN_CONFIG_PATH", self.config_path())
            .env("PROVMAN_NO_PROGRESS", "1")
            .env("HOME", &self.home_dir)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn run_provman(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.command().args(args).output().context("Failed to run provman")?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.success,
            "Command failed with code {:?}\nStdout: {}\nStderr: {}",
            self.code, self.stdout, self.stderr
        );
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(!self.success, "Command unexpectedly succeeded\nStdout: {}", self.stdout);
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Expected stdout to contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Expected stderr to contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
