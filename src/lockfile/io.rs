//! Loading and saving lock files.

use std::path::Path;

use tracing::{debug, warn};

use super::{LockFileError, Locks, decode_locks, encode_locks};
use crate::core::diagnostics::Diagnostics;
use crate::utils::fs::atomic_write;

impl Locks {
    /// Load a lock file, returning warnings alongside the locks.
    ///
    /// A missing file yields empty locks. Any error diagnostic fails the
    /// load with [`LockFileError::MalformedLockFile`] carrying every
    /// diagnostic found, warnings included.
    pub fn load_with_diagnostics(path: &Path) -> Result<(Self, Diagnostics), LockFileError> {
        let src = match std::fs::read_to_string(path) {
            Ok(src) => src,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "provman::lockfile", "no lock file at {}", path.display());
                return Ok((Self::new(), Diagnostics::new()));
            }
            Err(e) => {
                return Err(LockFileError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };

        let (locks, diagnostics) = decode_locks(&src);
        if diagnostics.has_errors() {
            return Err(LockFileError::MalformedLockFile {
                path: path.to_path_buf(),
                diagnostics,
            });
        }
        debug!(target: "provman::lockfile", "loaded {} provider locks from {}", locks.len(), path.display());
        Ok((locks, diagnostics))
    }

    /// Load a lock file, logging any warnings.
    pub fn load(path: &Path) -> Result<Self, LockFileError> {
        let (locks, diagnostics) = Self::load_with_diagnostics(path)?;
        for diag in diagnostics.warnings() {
            warn!(target: "provman::lockfile", "{}: {diag}", path.display());
        }
        Ok(locks)
    }

    /// Write the lock file, atomically replacing any previous one.
    pub fn save(&self, path: &Path) -> Result<(), LockFileError> {
        atomic_write(path, encode_locks(self).as_bytes()).map_err(|e| LockFileError::Io {
            path: path.to_path_buf(),
            message: format!("{e:#}"),
        })
    }
}
