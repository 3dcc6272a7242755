//! Errors raised by the storage layer.
//!
//! Every variant carries the path it failed on so callers can log and report
//! without re-deriving context.

use std::io;
use std::path::{Path, PathBuf};

/// Closed set of storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Empty buffer provided")]
    EmptyBuffer,

    #[error("Invalid filename provided")]
    InvalidFilename,

    #[error("Invalid file extension {extension:?}; allowed: mp3, wav, ogg, m4a, flac")]
    InvalidExtension { extension: String },

    #[error("Failed to save audio file {}: {source}", .path.display())]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid input file path: {}", .0.display())]
    InvalidInput(PathBuf),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File operation failed for {}: {source}", .path.display())]
    FileOperationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create directory {}: {source}", .directory.display())]
    DirectoryCreateFailed {
        directory: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directory operation failed for {}: {source}", .directory.display())]
    DirectoryOperationFailed {
        directory: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid file pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Chunk handler failed while reading {}: {source}", .path.display())]
    ChunkHandlerFailed {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StorageError {
    /// Translate an OS error for `path`: a missing file becomes `FileNotFound`,
    /// anything else `FileOperationFailed`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StorageError::FileNotFound(path.to_path_buf())
        } else {
            StorageError::FileOperationFailed {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Whether the failure was caused by what the client sent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StorageError::EmptyBuffer
                | StorageError::InvalidFilename
                | StorageError::InvalidExtension { .. }
        )
    }
}
