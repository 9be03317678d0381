// Error types for archive access and delta production.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::archive::ContentId;

/// Errors raised by the package container (reader and writer).
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O error while reading or writing the container.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The bytes do not form a valid package container.
    #[error("invalid package archive: {0}")]
    Invalid(String),

    /// A feature of the container is not available in this build.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The requested path is not in the manifest.
    #[error("no entry named {0:?}")]
    MissingEntry(String),

    /// Entry content does not hash to the manifest's content id.
    #[error("content mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: ContentId,
        actual: ContentId,
    },

    /// Writer received entries out of manifest order.
    #[error("entry {path:?} added after {previous:?}: paths must be strictly increasing")]
    OutOfOrder { path: String, previous: String },

    /// Metadata could not be (de)serialised.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The handle was closed.
    #[error("archive handle is closed")]
    Closed,
}

impl ArchiveError {
    /// Whether this error means "the file is not a valid package", as opposed
    /// to "the file could not be read".
    pub fn is_invalid_format(&self) -> bool {
        match self {
            Self::Invalid(_) | Self::Unsupported(_) | Self::Metadata(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData
            ),
            _ => false,
        }
    }
}

/// Errors surfaced by delta production.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// A source path is missing or unreadable.
    #[error("cannot open {path}: {source}")]
    OpenFailure {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// A source path exists but is not a valid package archive.
    #[error("{path} is not a valid package archive: {source}")]
    InvalidArchive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// An input is itself a delta; its manifest lacks the unchanged files.
    #[error("{package} is a delta package (base release {base_release}), not a full package")]
    DeltaInput { package: String, base_release: u64 },

    /// The two archives describe different software.
    #[error("package name mismatch: {old:?} vs {new:?}")]
    NameMismatch { old: String, new: String },

    /// The two archives were built for different architectures.
    #[error("architecture mismatch: {old:?} vs {new:?}")]
    ArchitectureMismatch { old: String, new: String },

    /// The new release does not strictly follow the old release.
    #[error("release {new} does not follow release {old}")]
    NonMonotonicRelease { old: u64, new: u64 },

    /// Streaming entries or writing the output failed.
    #[error("failed to assemble delta {path}: {source}")]
    AssemblyFailure {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// The output already exists and the overwrite policy forbids replacing it.
    #[error("delta output already exists: {0}")]
    OutputExists(PathBuf),

    /// The producer was closed.
    #[error("delta producer is closed")]
    AlreadyClosed,
}

impl DeltaError {
    /// Classify an archive open error for `path`.
    pub(crate) fn from_open(path: impl Into<PathBuf>, source: ArchiveError) -> Self {
        let path = path.into();
        if source.is_invalid_format() {
            Self::InvalidArchive { path, source }
        } else {
            Self::OpenFailure { path, source }
        }
    }

    pub(crate) fn assembly(path: impl Into<PathBuf>, source: impl Into<ArchiveError>) -> Self {
        Self::AssemblyFailure {
            path: path.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_classified_as_invalid() {
        let err = ArchiveError::Io(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(
            DeltaError::from_open("x", err),
            DeltaError::InvalidArchive { .. }
        ));
    }

    #[test]
    fn not_found_classified_as_open_failure() {
        let err = ArchiveError::Io(io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(
            DeltaError::from_open("x", err),
            DeltaError::OpenFailure { .. }
        ));
    }

    #[test]
    fn display_names_releases() {
        let err = DeltaError::NonMonotonicRelease { old: 118, new: 117 };
        assert_eq!(err.to_string(), "release 117 does not follow release 118");
    }
}
