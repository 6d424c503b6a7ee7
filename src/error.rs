//! Error types for archive operations.
//!
//! [`ArchiveError`] is the codec-level taxonomy. [`EngineError`] wraps it with
//! the operation that failed, which is what the presentation layer reports.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while reading or writing an archive container.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The file is missing, truncated, or not a ZIP container.
    #[error("not a valid archive: {0}")]
    NotAnArchive(String),

    /// A requested member path does not exist in the archive.
    #[error("member not found in archive: {0}")]
    MemberNotFound(String),

    /// A member exists but its data cannot be decoded.
    #[error("corrupt member '{name}': {reason}")]
    CorruptMember { name: String, reason: String },

    /// A member name would be extracted outside the destination directory.
    #[error("refusing to extract unsafe member path: {0}")]
    UnsafePath(String),

    /// An I/O error on a specific filesystem path.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

impl ArchiveError {
    pub fn not_an_archive(reason: impl Into<String>) -> Self {
        ArchiveError::NotAnArchive(reason.into())
    }

    pub fn corrupt(name: &str, reason: impl Into<String>) -> Self {
        ArchiveError::CorruptMember {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

// Generic conversion for call sites that have no path at hand.
impl From<io::Error> for ArchiveError {
    fn from(source: io::Error) -> Self {
        ArchiveError::Io {
            source,
            path: PathBuf::new(),
        }
    }
}

impl From<walkdir::Error> for ArchiveError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("filesystem loop while walking directory"));
        ArchiveError::Io { source, path }
    }
}

/// Attach the offending path to an `io::Result`.
pub trait IoResultExt<T> {
    fn with_path(self, path: &Path) -> Result<T, ArchiveError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T, ArchiveError> {
        self.map_err(|source| ArchiveError::Io {
            source,
            path: path.to_path_buf(),
        })
    }
}

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

/// Errors reported by [`ArchiveEngine`](crate::ArchiveEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another operation is still running on this engine.
    #[error("another archive operation is already in progress")]
    Busy,

    #[error("failed to list archive: {0}")]
    ListFailed(#[source] ArchiveError),

    #[error("failed to create archive: {0}")]
    CreateFailed(#[source] ArchiveError),

    #[error("failed to extract archive: {0}")]
    ExtractFailed(#[source] ArchiveError),

    #[error("failed to repack archive: {0}")]
    RepackFailed(#[source] ArchiveError),

    /// The background worker panicked before reporting an outcome.
    #[error("archive worker terminated unexpectedly: {0}")]
    Worker(String),
}

impl EngineError {
    /// The codec-level cause, when the failure came from the archive itself.
    pub fn cause(&self) -> Option<&ArchiveError> {
        match self {
            EngineError::ListFailed(e)
            | EngineError::CreateFailed(e)
            | EngineError::ExtractFailed(e)
            | EngineError::RepackFailed(e) => Some(e),
            EngineError::Busy | EngineError::Worker(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_path() {
        let err = Err::<(), _>(io::Error::from(io::ErrorKind::PermissionDenied))
            .with_path(Path::new("/tmp/out.xip"))
            .unwrap_err();
        assert!(err.to_string().contains("/tmp/out.xip"));
    }

    #[test]
    fn engine_error_exposes_cause() {
        let err = EngineError::ExtractFailed(ArchiveError::MemberNotFound("a.txt".into()));
        assert!(matches!(err.cause(), Some(ArchiveError::MemberNotFound(name)) if name == "a.txt"));
        assert!(EngineError::Busy.cause().is_none());
    }
}
