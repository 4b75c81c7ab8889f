//! Terminal rendering of installer events.
//!
//! [`InstallProgress`] implements [`InstallerEvents`] with `indicatif`: an
//! overall bar counting processed providers and one spinner line per
//! provider showing what is currently happening to it.
//!
//! # Environment Variables
//!
//! - `PROVMAN_NO_PROGRESS`: set to any value to hide all progress output,
//!   e.g. in CI logs or scripts
//!
//! Hidden bars accept every call and draw nothing, so callers never need
//! to check whether progress is enabled.

use std::path::Path;
use std::time::Duration;

use dashmap::DashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::addrs::Provider;
use crate::installer::{InstallerEvents, ProviderInstallError};
use crate::source::{PackageHash, PackageLocation, Version, VersionConstraints};

/// Whether `PROVMAN_NO_PROGRESS` is set.
pub fn is_progress_disabled() -> bool {
    std::env::var("PROVMAN_NO_PROGRESS").is_ok()
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
}

pub struct InstallProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    lines: DashMap<Provider, ProgressBar>,
    hidden: bool,
}

impl InstallProgress {
    /// A renderer drawing to stderr, or hidden when `PROVMAN_NO_PROGRESS`
    /// is set.
    pub fn new() -> Self {
        Self::with_hidden(is_progress_disabled())
    }

    pub fn hidden() -> Self {
        Self::with_hidden(true)
    }

    fn with_hidden(hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(bar_style());
        overall.set_prefix("Installing");
        Self {
            multi,
            overall,
            lines: DashMap::new(),
            hidden,
        }
    }

    /// Number of providers processed so far.
    pub fn position(&self) -> u64 {
        self.overall.position()
    }

    fn line(&self, provider: &Provider) -> ProgressBar {
        self.lines
            .entry(provider.clone())
            .or_insert_with(|| {
                let line = self.multi.add(ProgressBar::new_spinner());
                line.set_style(spinner_style());
                if !self.hidden {
                    line.enable_steady_tick(Duration::from_millis(100));
                }
                line
            })
            .clone()
    }

    fn done(&self, provider: &Provider, message: String) {
        if let Some((_, line)) = self.lines.remove(provider) {
            line.finish_with_message(message);
        } else if !self.hidden {
            let _ = self.multi.println(message);
        }
        self.overall.inc(1);
    }
}

impl Default for InstallProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallerEvents for InstallProgress {
    fn pending_providers(&self, providers: &[Provider]) {
        self.overall.set_length(providers.len() as u64);
    }

    fn builtin_provider_available(&self, provider: &Provider) {
        if !self.hidden {
            let _ = self.multi.println(format!("  - {provider} is built in"));
        }
    }

    fn provider_already_installed(&self, provider: &Provider, version: &Version) {
        self.done(provider, format!("{provider} {version} (already installed)"));
    }

    fn querying_available_versions(&self, provider: &Provider) {
        self.line(provider).set_message(format!("Finding versions of {provider}..."));
    }

    fn selected_version(&self, provider: &Provider, version: &Version, from_lock: bool) {
        let origin = if from_lock { " (locked)" } else { "" };
        self.line(provider).set_message(format!("Using {provider} {version}{origin}"));
    }

    fn query_failed(&self, provider: &Provider, constraints: &VersionConstraints, err: &ProviderInstallError) {
        let constraints = if constraints.is_empty() { "any version".to_string() } else { constraints.to_string() };
        self.done(provider, format!("{provider} ({constraints}): {}", err.summary()));
    }

    fn fetch_begin(&self, provider: &Provider, version: &Version, location: &PackageLocation) {
        self.line(provider).set_message(format!("Installing {provider} {version} from {location}..."));
    }

    fn linked_from_global_cache(&self, provider: &Provider, version: &Version, _from: &Path) {
        self.line(provider).set_message(format!("Copying {provider} {version} from the plugin cache..."));
    }

    fn fetch_success(&self, provider: &Provider, version: &Version, hash: &PackageHash) {
        self.done(provider, format!("{provider} {version} installed ({hash})"));
    }

    fn fetch_failure(&self, provider: &Provider, version: &Version, err: &ProviderInstallError) {
        self.done(provider, format!("{provider} {version}: {}", err.summary()));
    }

    fn finished(&self, installed: usize, failed: usize) {
        for entry in &self.lines {
            entry.value().finish_and_clear();
        }
        self.lines.clear();
        if let Some(len) = self.overall.length() {
            self.overall.set_position(len);
        }
        let message = if failed == 0 {
            format!("{installed} provider(s) ready")
        } else {
            format!("{installed} provider(s) ready, {failed} failed")
        };
        self.overall.finish_with_message(message);
    }
}
