//! The `provman.toml` settings file.
//!
//! ```toml
//! plugin_cache_dir = "~/.provman/plugin-cache"
//! selection_policy = "newest"        # or "prefer-cached"
//! max_parallel = 8
//!
//! [[provider_installation]]
//! filesystem_mirror = "/opt/providers"
//! include = ["example.com/*/*"]
//!
//! [[provider_installation]]
//! network_mirror = "https://mirror.example.com/providers/"
//! exclude = ["example.com/*/*"]
//! ```
//!
//! Each `[[provider_installation]]` entry becomes one selector of a
//! [`MultiSource`], in file order, with its own [`MemoizeSource`] so repeated
//! queries during a run hit the origin once. Without any entry, providers
//! are looked up in the implied local mirror `~/.provman/plugins`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheDir;
use crate::installer::{Installer, SelectionPolicy};
use crate::source::multi::parse_patterns;
use crate::source::{
    FilesystemMirrorSource, HttpMirrorSource, MemoizeSource, MultiSource, MultiSourceSelector, Source,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Shared cache consulted before fetching and populated after.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_cache_dir: Option<String>,

    #[serde(default)]
    pub selection_policy: SelectionPolicy,

    /// Upper bound on providers processed at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_installation: Vec<InstallationMethod>,
}

/// One way of obtaining provider packages.
///
/// Exactly one of `filesystem_mirror` and `network_mirror` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_mirror: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mirror: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl Settings {
    /// Load from [`super::default_config_path`], or defaults if the file
    /// does not exist.
    pub fn load() -> Result<Self> {
        let path = super::default_config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!(target: "provman::config", "no settings file at {}", path.display());
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse settings from {}", path.display()))
    }

    #[must_use]
    pub fn plugin_cache_dir(&self) -> Option<PathBuf> {
        self.plugin_cache_dir.as_deref().map(expand_path)
    }

    /// The combined source described by the `provider_installation` entries.
    pub fn source(&self) -> Result<Arc<dyn Source>> {
        if self.provider_installation.is_empty() {
            let implied = super::provman_home()?.join("plugins");
            debug!(target: "provman::config", "using implied local mirror {}", implied.display());
            return Ok(Arc::new(MemoizeSource::new(FilesystemMirrorSource::new(implied))));
        }

        let selectors = self
            .provider_installation
            .iter()
            .enumerate()
            .map(|(i, method)| {
                method.selector().with_context(|| format!("Invalid provider_installation entry #{}", i + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(MultiSource::new(selectors)))
    }

    /// An [`Installer`] targeting `target` and configured from these
    /// settings.
    ///
    /// When `plugin_dirs` is non-empty the installer runs offline against
    /// those directories only and the configured installation methods are
    /// not used.
    pub fn installer(&self, target: Arc<CacheDir>, plugin_dirs: Vec<PathBuf>) -> Result<Installer> {
        let mut installer = if plugin_dirs.is_empty() {
            Installer::new(self.source()?, target)
        } else {
            Installer::from_plugin_dirs(plugin_dirs, target)
        };

        installer = installer.with_policy(self.selection_policy);
        if let Some(max) = self.max_parallel {
            installer = installer.with_max_parallel(max);
        }
        if let Some(dir) = self.plugin_cache_dir() {
            installer = installer.with_global_cache(Arc::new(CacheDir::new(dir)));
        }
        Ok(installer)
    }
}

impl InstallationMethod {
    fn selector(&self) -> Result<MultiSourceSelector> {
        let source: Arc<dyn Source> = match (&self.filesystem_mirror, &self.network_mirror) {
            (Some(dir), None) => Arc::new(MemoizeSource::new(FilesystemMirrorSource::new(expand_path(dir)))),
            (None, Some(url)) => Arc::new(MemoizeSource::new(HttpMirrorSource::new(url)?)),
            (Some(_), Some(_)) => bail!("set either filesystem_mirror or network_mirror, not both"),
            (None, None) => bail!("one of filesystem_mirror or network_mirror is required"),
        };

        Ok(MultiSourceSelector::new(source)
            .with_include(parse_patterns(self.include.as_slice())?)
            .with_exclude(parse_patterns(self.exclude.as_slice())?))
    }
}

fn expand_path(given: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(given).as_ref())
}
