use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::Archive;

use super::error::{PatchError, PatchErrorCode};
use super::matcher::{FontMatcher, MatchReport};

/// Read the replacement font program. Called before any rename so that an
/// unreadable font file can never strand the original behind a backup name.
pub fn read_font_bytes(path: &Path) -> Result<Vec<u8>, PatchError> {
    fs::read(path).map_err(|e| {
        PatchError::new(
            PatchErrorCode::UnreadableFont,
            format!("failed to read replacement font {}: {e}", path.display()),
        )
    })
}

/// Terminal failure states of the file-swap protocol.
///
/// Together with `Ok(MatchReport)` these enumerate every way a run can end:
/// the original path always holds either the patched container or the
/// pre-run bytes, except in the one `Unrestored` case, which names the
/// backup so a human can finish the job.
#[derive(Debug)]
pub enum SwapFailure {
    /// Nothing was renamed; the original file is untouched.
    BeforeBackup(PatchError),
    /// The patch step failed and the backup was renamed back over the
    /// original path.
    Restored { cause: PatchError },
    /// The patch step failed and the restore rename also failed; the backup
    /// path holds the only good copy.
    Unrestored {
        cause: PatchError,
        restore_error: String,
        backup_path: PathBuf,
    },
}

impl SwapFailure {
    pub fn cause(&self) -> &PatchError {
        match self {
            SwapFailure::BeforeBackup(cause) => cause,
            SwapFailure::Restored { cause } => cause,
            SwapFailure::Unrestored { cause, .. } => cause,
        }
    }
}

impl fmt::Display for SwapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapFailure::BeforeBackup(cause) => {
                write!(f, "{cause} (original file untouched)")
            }
            SwapFailure::Restored { cause } => {
                write!(f, "{cause} (original file restored from backup)")
            }
            SwapFailure::Unrestored {
                cause,
                restore_error,
                backup_path,
            } => {
                write!(
                    f,
                    "{cause}; restore failed: {restore_error}; backup remains at {}",
                    backup_path.display()
                )
            }
        }
    }
}

impl Error for SwapFailure {}

/// Runs the transactional backup/replace/restore protocol around one
/// container file.
///
/// The original is renamed to the backup path, the patched bytes are written
/// to the original path, and any failure after the rename tries to put the
/// backup over the original again. On success the backup is left in place as
/// the user's safety copy.
#[derive(Debug, Clone)]
pub struct Replacer {
    original: PathBuf,
    backup: PathBuf,
}

impl Replacer {
    pub fn new(original: impl Into<PathBuf>) -> Self {
        let original = original.into();
        let backup = backup_path_for(&original);
        Self { original, backup }
    }

    pub fn with_backup_path(original: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            original: original.into(),
            backup: backup.into(),
        }
    }

    pub fn original_path(&self) -> &Path {
        &self.original
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// True when a backup from an earlier aborted run is still on disk. It
    /// will be deleted and replaced by this run's rename.
    pub fn stale_backup_exists(&self) -> bool {
        self.backup.exists()
    }

    /// Load the container from the backup path, run the matcher over it, and
    /// write the re-serialized result to the original path.
    pub fn run(&self, matcher: &FontMatcher) -> Result<MatchReport, SwapFailure> {
        self.run_with(|backup| {
            let mut archive = Archive::load(backup).map_err(|e| {
                PatchError::new(
                    PatchErrorCode::ContainerLoad,
                    format!("failed to load container {}: {e}", backup.display()),
                )
            })?;
            let report = matcher.apply(&mut archive);
            let bytes = archive.to_bytes().map_err(|e| {
                PatchError::new(
                    PatchErrorCode::SerializeOrWrite,
                    format!("failed to serialize container: {e}"),
                )
            })?;
            Ok((bytes, report))
        })
    }

    /// Drive the swap protocol around an arbitrary patch step. The step
    /// receives the backup path and returns the bytes destined for the
    /// original path.
    pub fn run_with<F>(&self, patch: F) -> Result<MatchReport, SwapFailure>
    where
        F: FnOnce(&Path) -> Result<(Vec<u8>, MatchReport), PatchError>,
    {
        if !self.original.exists() {
            return Err(SwapFailure::BeforeBackup(PatchError::new(
                PatchErrorCode::MissingInput,
                format!("container {} does not exist", self.original.display()),
            )));
        }

        // A leftover backup from an aborted run is superseded: the file
        // about to be renamed is the last known-good original.
        if self.backup.exists() {
            if let Err(e) = fs::remove_file(&self.backup) {
                return Err(SwapFailure::BeforeBackup(PatchError::new(
                    PatchErrorCode::BackupRename,
                    format!(
                        "failed to remove stale backup {}: {e}",
                        self.backup.display()
                    ),
                )));
            }
        }

        if let Err(e) = fs::rename(&self.original, &self.backup) {
            return Err(SwapFailure::BeforeBackup(PatchError::new(
                PatchErrorCode::BackupRename,
                format!(
                    "failed to rename {} to {}: {e}",
                    self.original.display(),
                    self.backup.display()
                ),
            )));
        }

        // The original path is free from here on; every failure below must
        // try to move the backup over it again.
        let outcome = patch(&self.backup).and_then(|(bytes, report)| {
            fs::write(&self.original, &bytes).map_err(|e| {
                PatchError::new(
                    PatchErrorCode::SerializeOrWrite,
                    format!("failed to write {}: {e}", self.original.display()),
                )
            })?;
            Ok(report)
        });

        match outcome {
            Ok(report) => Ok(report),
            Err(cause) => Err(self.restore(cause)),
        }
    }

    fn restore(&self, cause: PatchError) -> SwapFailure {
        // A half-written file at the original path blocks the rename.
        if self.original.exists() {
            if let Err(e) = fs::remove_file(&self.original) {
                return SwapFailure::Unrestored {
                    cause,
                    restore_error: format!(
                        "failed to remove half-written {}: {e}",
                        self.original.display()
                    ),
                    backup_path: self.backup.clone(),
                };
            }
        }

        match fs::rename(&self.backup, &self.original) {
            Ok(()) => SwapFailure::Restored { cause },
            Err(e) => SwapFailure::Unrestored {
                cause,
                restore_error: format!(
                    "failed to rename {} back to {}: {e}",
                    self.backup.display(),
                    self.original.display()
                ),
                backup_path: self.backup.clone(),
            },
        }
    }
}

fn backup_path_for(original: &Path) -> PathBuf {
    let mut name = original
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    original.with_file_name(name)
}
