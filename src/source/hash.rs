//! Package content hashes.
//!
//! Two schemes are understood:
//!
//! - `h1:` hashes the *contents* of a package. Every file gets a line
//!   `"<sha256-hex>  <relative/path>\n"`; the lines are sorted by path and
//!   the SHA-256 of their concatenation is base64-encoded. The same value is
//!   produced from an unpacked directory or from the zip archive it came
//!   from, which is what lets a lock file verify packages across cache
//!   layouts.
//! - `zh:` is the lowercase hex SHA-256 of the packed `.zip` file itself, as
//!   published by registries. It can only verify packed archives.
//!
//! Hashes with any other prefix are preserved verbatim but never match.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

const H1_PREFIX: &str = "h1:";
const ZH_PREFIX: &str = "zh:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    /// Content hash over the unpacked file tree.
    V1,
    /// Hash of the packed zip archive.
    LegacyZip,
    Unknown,
}

/// A `scheme:value` hash string as stored in lock files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageHash(String);

impl PackageHash {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn scheme(&self) -> HashScheme {
        if self.0.starts_with(H1_PREFIX) {
            HashScheme::V1
        } else if self.0.starts_with(ZH_PREFIX) {
            HashScheme::LegacyZip
        } else {
            HashScheme::Unknown
        }
    }

    /// Check this hash against a package on disk.
    ///
    /// `packed` says whether `path` is a zip archive or an unpacked
    /// directory. A `zh:` hash cannot be checked against a directory and
    /// reports no match.
    pub fn matches(&self, path: &Path, packed: bool) -> io::Result<bool> {
        match (self.scheme(), packed) {
            (HashScheme::V1, false) => Ok(package_hash_v1_dir(path)? == *self),
            (HashScheme::V1, true) => Ok(package_hash_v1_zip(path)? == *self),
            (HashScheme::LegacyZip, true) => Ok(package_hash_legacy_zip(path)? == *self),
            _ => Ok(false),
        }
    }
}

impl fmt::Display for PackageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether any of `hashes` matches the package at `path`.
pub fn package_matches_any(path: &Path, packed: bool, hashes: &[PackageHash]) -> io::Result<bool> {
    for hash in hashes {
        if hash.matches(path, packed)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn combine_v1(mut lines: Vec<(String, String)>) -> PackageHash {
    lines.sort_by(|a, b| a.0.cmp(&b.0));
    let mut hasher = Sha256::new();
    for (path, digest) in &lines {
        hasher.update(format!("{digest}  {path}\n").as_bytes());
    }
    PackageHash(format!("{H1_PREFIX}{}", STANDARD.encode(hasher.finalize())))
}

fn sha256_hex(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// `h1:` hash of an unpacked package directory.
pub fn package_hash_v1_dir(dir: &Path) -> io::Result<PackageHash> {
    let mut lines = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).map_err(io::Error::other)?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        lines.push((relative, sha256_hex(File::open(entry.path())?)?));
    }
    Ok(combine_v1(lines))
}

/// `h1:` hash of a packed archive, computed from its entries.
pub fn package_hash_v1_zip(archive: &Path) -> io::Result<PackageHash> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?).map_err(io::Error::other)?;
    let mut lines = Vec::new();
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(io::Error::other)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        lines.push((name, sha256_hex(entry)?));
    }
    Ok(combine_v1(lines))
}

/// `zh:` hash of a packed archive.
pub fn package_hash_legacy_zip(archive: &Path) -> io::Result<PackageHash> {
    let digest = sha256_hex(File::open(archive)?)?;
    Ok(PackageHash(format!("{ZH_PREFIX}{digest}")))
}
