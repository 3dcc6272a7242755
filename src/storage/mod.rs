//! # Temporary File Storage
//!
//! Everything the pipeline needs from the local filesystem lives here:
//! - **FileStore**: writes uploads under unique names and removes them again
//!   (single, batch, and directory sweeps)
//! - **FileReader**: reads persisted files back as a whole buffer or as a
//!   chunked stream, and reports file metadata
//! - **TranscriptSink**: persists the final transcript text
//!
//! ## Ownership Rule:
//! A pipeline run only ever removes paths it created itself. Sweeps are the one
//! exception; they skip every path a running job has claimed.

pub mod error;        // StorageError taxonomy
pub mod file_reader;  // Whole-buffer and chunked reads
pub mod file_store;   // Save / remove / sweep
pub mod transcript;   // Transcript persistence

pub use error::StorageError;
pub use file_reader::{FileMetadata, FileReader, StreamOptions};
pub use file_store::{BatchRemovalReport, FileStore, PersistedFile, RemovalOutcome};
pub use transcript::{FileTranscriptSink, TranscriptSink};
