//! Value types shared by every provider source.
//!
//! Versions, version constraints, platforms and package metadata are plain
//! immutable values. Each has exactly one canonical string form, which is
//! what gets persisted and compared.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use super::hash::PackageHash;
use crate::addrs::Provider;

/// A provider release version.
pub type Version = semver::Version;

/// A list of versions, as returned by [`super::Source::available_versions`].
///
/// Sources return lists sorted ascending with no duplicates.
pub type VersionList = Vec<Version>;

/// Sort ascending and remove duplicates.
pub fn normalize_version_list(list: &mut VersionList) {
    list.sort();
    list.dedup();
}

/// Errors from parsing versions, constraints and platforms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid version {given:?}: {reason}")]
    Version {
        given: String,
        reason: String,
    },

    #[error("invalid version constraint {given:?}: {reason}")]
    Constraint {
        given: String,
        reason: String,
    },

    #[error("invalid platform {given:?}: must be two words separated by an underscore, like \"linux_amd64\"")]
    Platform {
        given: String,
    },
}

/// Parse a version number.
///
/// Partial versions such as `1` or `1.2` are accepted and padded with zeros,
/// so `parse_version("1.2")` renders back as `1.2.0`. Callers that store
/// versions compare the rendered form with the input to enforce canonical
/// spelling.
pub fn parse_version(given: &str) -> Result<Version, ParseError> {
    let invalid = |reason: String| ParseError::Version {
        given: given.to_string(),
        reason,
    };

    let split_at = given.find(['-', '+']).unwrap_or(given.len());
    let (core, suffix) = given.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if core.is_empty() || parts.len() > 3 {
        return Err(invalid("must have one to three dot-separated numbers".to_string()));
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    Version::parse(&padded).map_err(|e| invalid(e.to_string()))
}

/// Comparison operator of a single version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// `~>`: the rightmost given component may increase.
    Pessimistic,
}

impl ConstraintOp {
    fn prefix(self) -> &'static str {
        match self {
            Self::Equal => "",
            Self::NotEqual => "!= ",
            Self::GreaterThan => "> ",
            Self::GreaterThanOrEqual => ">= ",
            Self::LessThan => "< ",
            Self::LessThanOrEqual => "<= ",
            Self::Pessimistic => "~> ",
        }
    }
}

/// One predicate such as `>= 1.2.0`.
///
/// Field order matters: the derived ordering sorts by boundary, then
/// operator, which is the canonical ordering of a constraint list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionConstraint {
    pub boundary: Version,
    pub op: ConstraintOp,
    /// Number of version components written, only significant for `~>`.
    pub precision: u8,
}

impl VersionConstraint {
    pub fn parse(given: &str) -> Result<Self, ParseError> {
        let trimmed = given.trim();
        let (op, rest) = [
            ("~>", ConstraintOp::Pessimistic),
            (">=", ConstraintOp::GreaterThanOrEqual),
            ("<=", ConstraintOp::LessThanOrEqual),
            ("!=", ConstraintOp::NotEqual),
            (">", ConstraintOp::GreaterThan),
            ("<", ConstraintOp::LessThan),
            ("=", ConstraintOp::Equal),
        ]
        .into_iter()
        .find_map(|(prefix, op)| trimmed.strip_prefix(prefix).map(|rest| (op, rest.trim_start())))
        .unwrap_or((ConstraintOp::Equal, trimmed));

        if rest.is_empty() {
            return Err(ParseError::Constraint {
                given: given.to_string(),
                reason: "missing version number".to_string(),
            });
        }

        let core_len = rest.find(['-', '+']).unwrap_or(rest.len());
        let precision = rest[..core_len].split('.').count().min(3) as u8;
        let boundary = parse_version(rest).map_err(|e| ParseError::Constraint {
            given: given.to_string(),
            reason: e.to_string(),
        })?;

        let precision = if op == ConstraintOp::Pessimistic { precision } else { 3 };
        Ok(Self {
            boundary,
            op,
            precision,
        })
    }

    /// Whether `version` satisfies this predicate, ignoring prerelease rules.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        let cmp = version.cmp(&self.boundary);
        match self.op {
            ConstraintOp::Equal => cmp == Ordering::Equal,
            ConstraintOp::NotEqual => cmp != Ordering::Equal,
            ConstraintOp::GreaterThan => cmp == Ordering::Greater,
            ConstraintOp::GreaterThanOrEqual => cmp != Ordering::Less,
            ConstraintOp::LessThan => cmp == Ordering::Less,
            ConstraintOp::LessThanOrEqual => cmp != Ordering::Greater,
            ConstraintOp::Pessimistic => {
                if cmp == Ordering::Less {
                    return false;
                }
                let b = &self.boundary;
                if self.precision >= 3 {
                    version.major == b.major && version.minor == b.minor
                } else {
                    version.major == b.major
                }
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.prefix())?;
        let b = &self.boundary;
        match (self.op, self.precision) {
            (ConstraintOp::Pessimistic, 1) => write!(f, "{}", b.major)?,
            (ConstraintOp::Pessimistic, 2) => write!(f, "{}.{}", b.major, b.minor)?,
            _ => return write!(f, "{b}"),
        }
        if !b.pre.is_empty() {
            write!(f, "-{}", b.pre)?;
        }
        if !b.build.is_empty() {
            write!(f, "+{}", b.build)?;
        }
        Ok(())
    }
}

/// A set of version predicates that must all hold.
///
/// Stored sorted and deduplicated, so `to_string()` is always the canonical
/// serialized form. An empty set accepts every release version; whether a
/// requirement is "unconstrained" versus "explicitly empty" is modelled by
/// wrapping in `Option` where the distinction matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionConstraints(Vec<VersionConstraint>);

impl VersionConstraints {
    #[must_use]
    pub fn new(mut constraints: Vec<VersionConstraint>) -> Self {
        constraints.sort();
        constraints.dedup();
        Self(constraints)
    }

    /// Parse a comma-separated constraint string. An empty or blank string
    /// yields an empty set.
    pub fn parse(given: &str) -> Result<Self, ParseError> {
        if given.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut constraints = Vec::new();
        for part in given.split(',') {
            if part.trim().is_empty() {
                return Err(ParseError::Constraint {
                    given: given.to_string(),
                    reason: "empty constraint between commas".to_string(),
                });
            }
            constraints.push(VersionConstraint::parse(part)?);
        }
        Ok(Self::new(constraints))
    }

    /// An exact pin on one version.
    #[must_use]
    pub fn exactly(version: &Version) -> Self {
        Self(vec![VersionConstraint {
            boundary: version.clone(),
            op: ConstraintOp::Equal,
            precision: 3,
        }])
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionConstraint> {
        self.0.iter()
    }

    /// Whether `version` is acceptable.
    ///
    /// Prerelease versions are only acceptable when an exact `=` predicate
    /// names them; otherwise every predicate must hold.
    #[must_use]
    pub fn allows(&self, version: &Version) -> bool {
        if !version.pre.is_empty() {
            let exactly_named = self
                .0
                .iter()
                .any(|c| c.op == ConstraintOp::Equal && &c.boundary == version);
            if !exactly_named {
                return false;
            }
        }
        self.0.iter().all(|c| c.matches(version))
    }

    /// Union of two constraint sets, as used when requirements from several
    /// origins apply to the same provider.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut all = self.0.clone();
        all.extend(other.0.iter().cloned());
        Self::new(all)
    }

    /// The greatest version in `available` accepted by these constraints.
    #[must_use]
    pub fn newest_allowed<'a>(&self, available: &'a [Version]) -> Option<&'a Version> {
        available.iter().filter(|v| self.allows(v)).max()
    }
}

impl fmt::Display for VersionConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for VersionConstraints {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Target operating system and architecture, rendered as `os_arch`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    #[must_use]
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Parse `os_arch`. Input is case-folded; compare with `to_string()` to
    /// require canonical spelling.
    pub fn parse(given: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::Platform {
            given: given.to_string(),
        };
        let (os, arch) = given.split_once('_').ok_or_else(invalid)?;
        let valid_word =
            |w: &str| !w.is_empty() && w.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid_word(os) || !valid_word(arch) {
            return Err(invalid());
        }
        Ok(Self::new(&os.to_ascii_lowercase(), &arch.to_ascii_lowercase()))
    }

    /// The platform this process is running on, using the registry's
    /// naming convention.
    #[must_use]
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "x86" => "386",
            "aarch64" => "arm64",
            other => other,
        };
        Self::new(os, arch)
    }

    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Where a provider package can be obtained from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLocation {
    /// A packed `.zip` archive on the local filesystem.
    LocalArchive(PathBuf),
    /// An already-unpacked package directory, such as another cache.
    LocalDir(PathBuf),
    /// A packed archive to download.
    HttpUrl(String),
}

impl fmt::Display for PackageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalArchive(path) | Self::LocalDir(path) => write!(f, "{}", path.display()),
            Self::HttpUrl(url) => f.write_str(url),
        }
    }
}

/// Identifies one fetchable provider package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMeta {
    pub provider: Provider,
    pub version: Version,
    pub target_platform: Platform,
    pub filename: String,
    pub location: PackageLocation,
    /// Hashes the origin vouched for at discovery time, if any.
    pub hashes: Vec<PackageHash>,
}

impl PackageMeta {
    /// Conventional archive file name for a package.
    #[must_use]
    pub fn archive_filename(provider: &Provider, version: &Version, platform: &Platform) -> String {
        format!(
            "{}{}_{}_{}.zip",
            crate::constants::PROVIDER_EXECUTABLE_PREFIX,
            provider.type_name,
            version,
            platform
        )
    }

    #[must_use]
    pub fn is_packed(&self) -> bool {
        !matches!(self.location, PackageLocation::LocalDir(_))
    }
}
