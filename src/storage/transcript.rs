//! Transcript persistence.
//!
//! The sink keeps a single, well-known transcript file that every successful
//! run overwrites. Writes go through a uniquely named staging file and a
//! rename, so concurrent runs resolve to last-writer-wins and the file is
//! never observed half written.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use super::file_store::write_atomically;
use super::StorageError;

/// Where the transcript goes when nothing else is configured.
pub const DEFAULT_TRANSCRIPT_PATH: &str = "transcripts/transcription.txt";

/// Destination for finished transcripts.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Persist `text`, returning where it was written.
    async fn save(&self, text: &str) -> Result<PathBuf, StorageError>;
}

/// Writes the transcript to a fixed file, overwriting the previous one.
#[derive(Debug, Clone)]
pub struct FileTranscriptSink {
    path: PathBuf,
}

impl FileTranscriptSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transcript".to_string());
        self.path
            .with_file_name(format!(".{}.{}.part", name, Uuid::new_v4()))
    }
}

impl Default for FileTranscriptSink {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSCRIPT_PATH)
    }
}

#[async_trait]
impl TranscriptSink for FileTranscriptSink {
    async fn save(&self, text: &str) -> Result<PathBuf, StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::DirectoryCreateFailed {
                    directory: parent.to_path_buf(),
                    source,
                })?;
        }

        let staging = self.staging_path();
        write_atomically(&staging, &self.path, text.as_bytes())
            .await
            .map_err(|e| StorageError::from_io(&self.path, e))?;

        info!(path = %self.path.display(), chars = text.chars().count(), "Transcribed text saved");
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("transcripts").join("transcription.txt");
        let sink = FileTranscriptSink::new(&target);

        let written = sink.save("Привіт, світ").await.unwrap();

        assert_eq!(written, target);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "Привіт, світ");
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_transcript() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("transcription.txt");
        let sink = FileTranscriptSink::new(&target);

        sink.save("first run").await.unwrap();
        sink.save("second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        // Only the transcript itself remains, no staging leftovers
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_save_into_directory_path_fails() {
        let temp = TempDir::new().unwrap();
        let sink = FileTranscriptSink::new(temp.path());

        let err = sink.save("text").await.unwrap_err();
        assert!(matches!(err, StorageError::FileOperationFailed { .. }));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_staging_file() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("transcription.txt");
        // A non-empty directory in the way makes the final step fail
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();
        let sink = FileTranscriptSink::new(&target);

        assert!(sink.save("text").await.is_err());

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["transcription.txt".to_string()]);
    }
}
