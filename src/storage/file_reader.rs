//! # File Reader
//!
//! Reads persisted files back, either whole or as a stream of bounded chunks.
//!
//! ## Rust Concepts:
//! - **BoxStream**: a pinned, boxed `Stream` so callers do not have to name the
//!   concrete reader type
//! - **Drop closes**: the underlying file handle is released as soon as the
//!   stream is dropped, whether it was read to the end or abandoned early

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use super::StorageError;

/// Default chunk size for streamed reads (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Stream of file chunks. Each chunk is at most the configured chunk size.
pub type ChunkStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// Options for [`FileReader::open_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub chunk_size: usize,
    /// First byte to read (inclusive)
    pub start: Option<u64>,
    /// Last byte to read (inclusive)
    pub end: Option<u64>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            start: None,
            end: None,
        }
    }
}

impl StreamOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Number of bytes the range covers, `None` meaning "to end of file".
    fn range_len(&self) -> Option<u64> {
        let start = self.start.unwrap_or(0);
        self.end.map(|end| end.saturating_add(1).saturating_sub(start))
    }
}

/// Facts about a file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub size: u64,
    /// Not every filesystem records creation time
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
    pub extension: String,
    pub filename: String,
}

/// Stateless reader for files produced by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct FileReader;

impl FileReader {
    pub fn new() -> Self {
        Self
    }

    /// Read the whole file into memory.
    pub async fn read_to_buffer(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        ensure_exists(path).await?;

        let bytes = fs::read(path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Error reading file");
            StorageError::from_io(path, e)
        })?;

        debug!(path = %path.display(), size = bytes.len(), "File read successfully");
        Ok(bytes)
    }

    /// Open a lazily-read chunk stream over the file (or a byte range of it).
    pub async fn open_stream(&self, path: &Path, options: StreamOptions) -> Result<ChunkStream, StorageError> {
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        if let Some(start) = options.start.filter(|s| *s > 0) {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| StorageError::from_io(path, e))?;
        }

        let limit = options.range_len().unwrap_or(u64::MAX);
        let owned: PathBuf = path.to_path_buf();

        let stream = ReaderStream::with_capacity(file.take(limit), options.chunk_size.max(1))
            .map(move |chunk| chunk.map_err(|e| StorageError::from_io(&owned, e)));

        Ok(stream.boxed())
    }

    /// Stream the file through `on_chunk`, returning the number of bytes delivered.
    ///
    /// If the handler fails, reading stops immediately and the handler's error
    /// is returned wrapped with the path.
    pub async fn read_in_chunks<F>(
        &self,
        path: &Path,
        chunk_size: usize,
        mut on_chunk: F,
    ) -> Result<u64, StorageError>
    where
        F: FnMut(&[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut stream = self
            .open_stream(path, StreamOptions::with_chunk_size(chunk_size))
            .await?;
        let mut total = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Err(source) = on_chunk(&chunk) {
                error!(path = %path.display(), error = %source, "Error processing chunk");
                return Err(StorageError::ChunkHandlerFailed {
                    path: path.to_path_buf(),
                    source,
                });
            }
            total += chunk.len() as u64;
        }

        debug!(path = %path.display(), bytes = total, "Completed chunk reading");
        Ok(total)
    }

    /// Size, timestamps, and name parts of a file.
    pub async fn stat_metadata(&self, path: &Path) -> Result<FileMetadata, StorageError> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| StorageError::from_io(path, e))?;

        Ok(FileMetadata {
            size: metadata.len(),
            created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            modified_at: DateTime::<Utc>::from(modified),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }
}

async fn ensure_exists(path: &Path) -> Result<(), StorageError> {
    let exists = !path.as_os_str().is_empty() && fs::try_exists(path).await.unwrap_or(false);
    if exists {
        Ok(())
    } else {
        Err(StorageError::InvalidInput(path.to_path_buf()))
    }
}
