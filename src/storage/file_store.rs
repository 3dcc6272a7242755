//! # File Store
//!
//! Persists uploaded audio into a temporary directory under a collision-free
//! name and removes it again once a run is finished.
//!
//! ## Naming:
//! Saved files are named `<uuid-v4>.<original extension>`. The client-supplied
//! name only contributes its extension, so path components such as `../` never
//! reach the filesystem.
//!
//! ## Atomic Writes:
//! Bytes land in a hidden staging file first and are renamed into place, so a
//! reader never observes a half-written upload.
//!
//! ## Claimed Paths:
//! A path is claimed from the moment the store starts writing it until it is
//! removed through the store. Runs also claim files other tools write for
//! them (the normalizer's output). Directory sweeps skip claimed paths, so a
//! sweep never pulls a file out from under an in-flight run.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use regex::Regex;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::StorageError;

/// Extensions accepted for upload (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["mp3", "wav", "ogg", "m4a", "flac"];

/// Directory used when no other is configured.
pub const DEFAULT_DIRECTORY: &str = "tmp";

/// A file written by [`FileStore::save`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedFile {
    pub path: PathBuf,
    pub filename: String,
    /// Extension as the client supplied it, without the leading dot
    pub extension: String,
}

/// Result of removing one path. Removal never raises; failures are reported here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalOutcome {
    pub success: bool,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemovalOutcome {
    fn removed(path: &Path) -> Self {
        Self {
            success: true,
            path: path.to_path_buf(),
            error: None,
        }
    }

    fn failed(path: &Path, message: String) -> Self {
        Self {
            success: false,
            path: path.to_path_buf(),
            error: Some(message),
        }
    }
}

/// Summary of a batch removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRemovalReport {
    pub total_files: usize,
    pub removed: usize,
    pub failed: Vec<RemovalOutcome>,
}

impl BatchRemovalReport {
    fn from_outcomes(outcomes: Vec<RemovalOutcome>) -> Self {
        let total_files = outcomes.len();
        let failed: Vec<RemovalOutcome> = outcomes.into_iter().filter(|o| !o.success).collect();

        Self {
            total_files,
            removed: total_files - failed.len(),
            failed,
        }
    }

    /// True when every selected file was removed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Saves uploads under unique names and removes them again.
///
/// Clones share the claimed-path registry.
#[derive(Debug, Clone)]
pub struct FileStore {
    default_directory: PathBuf,
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

/// A regular file found while listing a directory.
struct ListedFile {
    name: String,
    path: PathBuf,
    modified: SystemTime,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTORY)
    }
}

impl FileStore {
    pub fn new(default_directory: impl Into<PathBuf>) -> Self {
        Self {
            default_directory: default_directory.into(),
            claimed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn default_directory(&self) -> &Path {
        &self.default_directory
    }

    fn claimed(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Protect `path` from directory sweeps until it is removed or unclaimed.
    pub fn claim(&self, path: impl Into<PathBuf>) {
        self.claimed().insert(path.into());
    }

    pub fn unclaim(&self, path: &Path) {
        self.claimed().remove(path);
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.claimed().contains(path)
    }

    /// Save `bytes` into the default directory.
    pub async fn save(&self, bytes: &[u8], original_name: &str) -> Result<PersistedFile, StorageError> {
        self.save_in(bytes, original_name, &self.default_directory).await
    }

    /// Save `bytes` into `directory`, creating it if needed.
    ///
    /// Validation happens before anything touches the disk, so a rejected
    /// upload leaves no trace behind.
    pub async fn save_in(
        &self,
        bytes: &[u8],
        original_name: &str,
        directory: &Path,
    ) -> Result<PersistedFile, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::EmptyBuffer);
        }
        let extension = validate_filename(original_name)?;

        fs::create_dir_all(directory)
            .await
            .map_err(|source| StorageError::DirectoryCreateFailed {
                directory: directory.to_path_buf(),
                source,
            })?;

        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        let path = directory.join(&filename);
        let staging = directory.join(format!(".{}.part", filename));

        self.claim(&path);
        self.claim(&staging);
        let written = write_atomically(&staging, &path, bytes).await;
        self.unclaim(&staging);
        if let Err(source) = written {
            self.unclaim(&path);
            return Err(StorageError::SaveFailed { path, source });
        }

        info!(path = %path.display(), bytes = bytes.len(), "Saved audio file");

        Ok(PersistedFile {
            path,
            filename,
            extension,
        })
    }

    /// Remove one file and drop its claim. Never fails; a missing file is
    /// reported, not raised.
    pub async fn remove(&self, path: impl AsRef<Path>) -> RemovalOutcome {
        let path = path.as_ref();
        let removed = remove_existing(path).await;
        self.unclaim(path);

        match removed {
            Ok(()) => {
                debug!(path = %path.display(), "Removed file");
                RemovalOutcome::removed(path)
            }
            Err(e) => {
                let message = format!("Failed to remove file {}: {}", path.display(), e);
                warn!("{}", message);
                RemovalOutcome::failed(path, message)
            }
        }
    }

    /// Remove many files concurrently and summarize.
    pub async fn remove_many<I, P>(&self, paths: I) -> BatchRemovalReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        let outcomes = join_all(paths.iter().map(|p| self.remove(p))).await;

        BatchRemovalReport::from_outcomes(outcomes)
    }

    /// Remove the unclaimed regular files in `directory` whose name matches a
    /// glob pattern (`*` any run of characters, `?` exactly one, everything
    /// else literal).
    pub async fn remove_by_pattern(
        &self,
        directory: &Path,
        pattern: &str,
    ) -> Result<BatchRemovalReport, StorageError> {
        let matcher = glob_to_regex(pattern).map_err(|source| StorageError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let selected: Vec<PathBuf> = self
            .sweepable_files(directory)
            .await?
            .into_iter()
            .filter(|file| matcher.is_match(&file.name))
            .map(|file| file.path)
            .collect();

        info!(
            directory = %directory.display(),
            pattern,
            matched = selected.len(),
            "Removing files by pattern"
        );

        Ok(self.remove_many(selected).await)
    }

    /// Remove the unclaimed regular files in `directory` last modified
    /// strictly before `threshold`.
    pub async fn remove_older_than(
        &self,
        directory: &Path,
        threshold: DateTime<Utc>,
    ) -> Result<BatchRemovalReport, StorageError> {
        let selected: Vec<PathBuf> = self
            .sweepable_files(directory)
            .await?
            .into_iter()
            .filter(|file| DateTime::<Utc>::from(file.modified) < threshold)
            .map(|file| file.path)
            .collect();

        info!(
            directory = %directory.display(),
            threshold = %threshold,
            matched = selected.len(),
            "Removing files older than threshold"
        );

        Ok(self.remove_many(selected).await)
    }

    async fn sweepable_files(&self, directory: &Path) -> Result<Vec<ListedFile>, StorageError> {
        let mut files = list_regular_files(directory).await?;
        let claimed = self.claimed();
        files.retain(|file| {
            let skip = claimed.contains(&file.path);
            if skip {
                debug!(path = %file.path.display(), "Skipping file claimed by a running job");
            }
            !skip
        });
        Ok(files)
    }
}

/// Check the client-supplied name and return its extension.
fn validate_filename(original_name: &str) -> Result<String, StorageError> {
    if original_name.trim().is_empty() {
        return Err(StorageError::InvalidFilename);
    }

    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    let lowered = extension.to_ascii_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&lowered.as_str()) {
        return Err(StorageError::InvalidExtension {
            extension: extension.to_string(),
        });
    }

    Ok(extension.to_string())
}

/// Write `bytes` to `staging`, then rename it over `target`. On any failure the
/// staging file is removed, so only `target` can ever hold data.
pub(super) async fn write_atomically(staging: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let result = async {
        let mut file = fs::File::create(staging).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(staging, target).await
    }
    .await;

    if result.is_err() {
        // Best effort; the staging name is private to the caller
        let _ = fs::remove_file(staging).await;
    }
    result
}

async fn remove_existing(path: &Path) -> io::Result<()> {
    if !fs::try_exists(path).await? {
        return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
    }
    fs::remove_file(path).await
}

/// Every regular file directly inside `directory`. Names that are not valid
/// UTF-8 are skipped, as are files that vanish while the listing runs.
async fn list_regular_files(directory: &Path) -> Result<Vec<ListedFile>, StorageError> {
    let dir_error = |source| StorageError::DirectoryOperationFailed {
        directory: directory.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(directory).await.map_err(dir_error)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!(name = ?raw, "Skipping non UTF-8 file name");
                continue;
            }
        };

        let Some(modified) = regular_file_mtime(entry.metadata().await).map_err(dir_error)? else {
            continue;
        };
        files.push(ListedFile {
            name,
            path: entry.path(),
            modified,
        });
    }

    Ok(files)
}

/// Modification time of a regular file; `None` for anything else, including
/// an entry removed since the directory was read.
fn regular_file_mtime(metadata: io::Result<std::fs::Metadata>) -> io::Result<Option<SystemTime>> {
    match metadata {
        Ok(meta) if meta.is_file() => meta.modified().map(Some),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Translate a glob into an anchored regular expression.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() * 2 + 6);
    expr.push_str("(?s)^");

    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => {
                let mut buf = [0u8; 4];
                expr.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }

    expr.push('$');
    Regex::new(&expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn names_in(dir: &Path) -> BTreeSet<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[tokio::test]
    async fn test_save_writes_bytes_under_unique_name() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("uploads"));

        let first = store.save(b"RIFF-data", "voice.wav").await.unwrap();
        let second = store.save(b"RIFF-data", "voice.wav").await.unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(first.extension, "wav");
        assert!(first.filename.ends_with(".wav"));
        assert_eq!(std::fs::read(&first.path).unwrap(), b"RIFF-data");
        // No staging files survive a successful save
        assert_eq!(names_in(&temp.path().join("uploads")).len(), 2);
    }

    #[tokio::test]
    async fn test_save_accepts_uppercase_extension() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let saved = store.save(b"ID3", "Meeting.MP3").await.unwrap();
        assert_eq!(saved.extension, "MP3");
        assert!(saved.path.exists());
    }

    #[tokio::test]
    async fn test_save_ignores_path_components_in_original_name() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let saved = store.save(b"fLaC", "../../etc/evil.flac").await.unwrap();
        assert_eq!(saved.path.parent(), Some(temp.path()));
    }

    #[tokio::test]
    async fn test_save_rejects_empty_buffer_without_touching_disk() {
        let temp = TempDir::new().unwrap();
        let directory = temp.path().join("never-created");
        let store = FileStore::new(&directory);

        let err = store.save(b"", "voice.wav").await.unwrap_err();
        assert!(matches!(err, StorageError::EmptyBuffer));
        assert!(!directory.exists());
    }

    #[tokio::test]
    async fn test_save_rejects_bad_names() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        assert!(matches!(
            store.save(b"data", "   ").await.unwrap_err(),
            StorageError::InvalidFilename
        ));
        assert!(matches!(
            store.save(b"data", "notes.txt").await.unwrap_err(),
            StorageError::InvalidExtension { .. }
        ));
        assert!(matches!(
            store.save(b"data", "voice.wav.exe").await.unwrap_err(),
            StorageError::InvalidExtension { .. }
        ));
        assert!(matches!(
            store.save(b"data", "noextension").await.unwrap_err(),
            StorageError::InvalidExtension { .. }
        ));
        assert!(names_in(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_remove_reports_missing_file_on_second_call() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let saved = store.save(b"data", "a.ogg").await.unwrap();

        let first = store.remove(&saved.path).await;
        assert!(first.success);
        assert!(first.error.is_none());

        let second = store.remove(&saved.path).await;
        assert!(!second.success);
        let message = second.error.unwrap();
        assert!(message.starts_with("Failed to remove file"));
        assert!(message.contains(&saved.filename));
    }

    #[tokio::test]
    async fn test_remove_many_counts_partial_failures() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let a = touch(temp.path(), "a.wav");
        let b = touch(temp.path(), "b.wav");
        let missing = temp.path().join("missing.wav");

        let report = store.remove_many([&a, &missing, &b]).await;

        assert_eq!(report.total_files, 3);
        assert_eq!(report.removed, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, missing);
        assert!(!report.is_clean());
        assert!(names_in(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_remove_many_with_no_paths() {
        let store = FileStore::default();
        let report = store.remove_many(Vec::<PathBuf>::new()).await;
        assert_eq!(report, BatchRemovalReport::default());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_remove_by_pattern_matches_whole_name_only() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        for name in ["a.wav", "d.wav", "b.WAV", "c.wav.bak", "wav", "x.wave", "awav"] {
            touch(temp.path(), name);
        }
        std::fs::create_dir(temp.path().join("sub.wav")).unwrap();

        let report = store.remove_by_pattern(temp.path(), "*.wav").await.unwrap();

        assert_eq!(report.total_files, 2);
        assert_eq!(report.removed, 2);
        let left = names_in(temp.path());
        assert!(!left.contains("a.wav"));
        assert!(!left.contains("d.wav"));
        for kept in ["b.WAV", "c.wav.bak", "wav", "x.wave", "awav", "sub.wav"] {
            assert!(left.contains(kept), "{kept} should survive");
        }
    }

    #[tokio::test]
    async fn test_remove_by_pattern_single_character_wildcard() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        for name in ["take1.mp3", "take2.mp3", "take10.mp3"] {
            touch(temp.path(), name);
        }

        let report = store.remove_by_pattern(temp.path(), "take?.mp3").await.unwrap();

        assert_eq!(report.removed, 2);
        assert_eq!(names_in(temp.path()), BTreeSet::from(["take10.mp3".to_string()]));
    }

    #[tokio::test]
    async fn test_remove_by_pattern_on_missing_directory() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let err = store
            .remove_by_pattern(&temp.path().join("absent"), "*")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DirectoryOperationFailed { .. }));
    }

    #[tokio::test]
    async fn test_remove_older_than_uses_strict_threshold() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        touch(temp.path(), "old.wav");
        touch(temp.path(), "older.mp3");

        let nothing = store
            .remove_older_than(temp.path(), Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(nothing.total_files, 0);
        assert_eq!(names_in(temp.path()).len(), 2);

        let everything = store
            .remove_older_than(temp.path(), Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(everything.removed, 2);
        assert!(names_in(temp.path()).is_empty());
    }

    #[test]
    fn test_glob_translation_escapes_regex_metacharacters() {
        let re = glob_to_regex("rec(1)+[a].wav").unwrap();
        assert!(re.is_match("rec(1)+[a].wav"));
        assert!(!re.is_match("rec1a.wav"));

        let re = glob_to_regex("*").unwrap();
        assert!(re.is_match(""));
        assert!(re.is_match("anything at all"));
    }

    #[tokio::test]
    async fn test_saved_bytes_read_back_unchanged() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let bytes: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();

        let saved = store.save(&bytes, "x.wav").await.unwrap();
        let read = crate::storage::FileReader::new().read_to_buffer(&saved.path).await.unwrap();

        assert_eq!(read, bytes);
    }

    #[tokio::test]
    async fn test_sweeps_skip_claimed_files() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let saved = store.save(b"data", "live.wav").await.unwrap();
        let converted = touch(temp.path(), "live_speech.wav");
        store.claim(&converted);
        touch(temp.path(), "stale.wav");

        let by_pattern = store.remove_by_pattern(temp.path(), "*").await.unwrap();
        assert_eq!(by_pattern.removed, 1);

        touch(temp.path(), "stale.wav");
        let by_age = store
            .remove_older_than(temp.path(), Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(by_age.removed, 1);

        assert!(saved.path.exists());
        assert!(converted.exists());

        // Removing through the store ends the claim
        assert!(store.remove(&saved.path).await.success);
        assert!(!store.is_claimed(&saved.path));
        store.unclaim(&converted);
        let rest = store.remove_by_pattern(temp.path(), "*").await.unwrap();
        assert_eq!(rest.removed, 1);
        assert!(names_in(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_claims() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let saved = store.save(b"data", "a.mp3").await.unwrap();

        let sweeper = store.clone();
        let report = sweeper.remove_by_pattern(temp.path(), "*.mp3").await.unwrap();

        assert_eq!(report.total_files, 0);
        assert!(saved.path.exists());
    }

    #[test]
    fn test_vanished_entry_is_skipped_not_fatal() {
        let vanished = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(regular_file_mtime(Err(vanished)).unwrap().is_none());

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(regular_file_mtime(Err(denied)).is_err());

        let temp = TempDir::new().unwrap();
        let file = touch(temp.path(), "a.wav");
        assert!(regular_file_mtime(std::fs::metadata(&file)).unwrap().is_some());
        assert!(regular_file_mtime(std::fs::metadata(temp.path())).unwrap().is_none());
    }
}
