//! # Audio Pipeline
//!
//! Orchestrates one upload end to end:
//!
//! ```text
//! validate ─► persist ─► normalize ─► re-read ─► transcribe ─► save transcript
//!                │            │
//!                └────────────┴──► cleanup (always)
//! ```
//!
//! ## Cleanup Guarantee:
//! Every temporary file the run creates is tracked in [`RunArtifacts`] and
//! claimed in the [`FileStore`], which keeps directory sweeps away from it. After the run completes, successfully or not, all
//! tracked files are removed concurrently. If the run future is dropped
//! instead (client disconnect, timeout), the artifact guard's `Drop` removes
//! them synchronously. Cleanup problems are logged and never change the run's
//! outcome.
//!
//! ## Concurrency:
//! Runs share nothing but the configured components; each run works on its
//! own uniquely named files.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn, Instrument};

use super::error::{PipelineError, ProcessingError};
use super::stage::{RunStage, RunTracker};
use crate::audio::{AudioMetadata, IntakeValidator, NormalizeError, Normalizer};
use crate::storage::{BatchRemovalReport, FileReader, FileStore, PersistedFile, TranscriptSink};
use crate::transcription::{Transcriber, TranscriptionResult};

/// An upload as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedAudio {
    pub bytes: Bytes,
    pub original_name: String,
    pub declared_size: usize,
    pub declared_mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalFileInfo {
    pub name: String,
    pub size: usize,
    pub mime_type: String,
}

/// What a successful run reports back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub metadata: AudioMetadata,
    pub transcription: TranscriptionResult,
    pub original_file: OriginalFileInfo,
}

/// Temporary files owned by one run, all claimed in the store.
///
/// `pending` holds paths a step is about to create; they are removed only if
/// they turn out to exist. `paths` holds files known to exist.
#[derive(Debug)]
struct RunArtifacts {
    store: FileStore,
    paths: Vec<PathBuf>,
    pending: Vec<PathBuf>,
}

impl RunArtifacts {
    fn new(store: &FileStore) -> Self {
        Self {
            store: store.clone(),
            paths: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn expect(&mut self, path: PathBuf) {
        self.store.claim(&path);
        self.pending.push(path);
    }

    fn track(&mut self, path: PathBuf) {
        self.pending.retain(|p| p != &path);
        self.store.claim(&path);
        self.paths.push(path);
    }

    /// Remove every tracked file and drop its claim. Afterwards the guard
    /// owns nothing.
    async fn release(&mut self) -> BatchRemovalReport {
        let mut paths = self.paths.clone();
        for path in &self.pending {
            if fs::try_exists(path).await.unwrap_or(false) {
                paths.push(path.clone());
            } else {
                self.store.unclaim(path);
            }
        }

        let report = self.store.remove_many(&paths).await;
        self.paths.clear();
        self.pending.clear();
        report
    }
}

impl Drop for RunArtifacts {
    fn drop(&mut self) {
        // Only reached with paths left when the run was cancelled mid-flight
        for path in self.paths.drain(..).chain(self.pending.drain(..)) {
            match std::fs::remove_file(&path) {
                Ok(()) => warn!(path = %path.display(), "Removed artifact of cancelled run"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove artifact of cancelled run"),
            }
            self.store.unclaim(&path);
        }
    }
}

pub struct AudioPipeline {
    validator: IntakeValidator,
    store: FileStore,
    reader: FileReader,
    normalizer: Normalizer,
    transcriber: Transcriber,
    sink: Arc<dyn TranscriptSink>,
}

impl AudioPipeline {
    pub fn new(
        store: FileStore,
        normalizer: Normalizer,
        transcriber: Transcriber,
        sink: Arc<dyn TranscriptSink>,
    ) -> Self {
        Self {
            validator: IntakeValidator::new(),
            store,
            reader: FileReader::new(),
            normalizer,
            transcriber,
            sink,
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Run one upload through the whole pipeline.
    ///
    /// ## Returns:
    /// - **Ok(PipelineOutcome)**: metadata, transcription, and the original
    ///   file's description; the transcript has been persisted
    /// - **Err(PipelineError)**: the first failing step; no temporary file of
    ///   this run remains either way
    pub async fn run(&self, upload: UploadedAudio) -> Result<PipelineOutcome, PipelineError> {
        let mut tracker = RunTracker::new();
        let span = tracing::info_span!(
            "pipeline_run",
            run_id = %tracker.run_id(),
            file = %upload.original_name,
        );

        async move {
            let mut artifacts = RunArtifacts::new(&self.store);
            let result = self.execute(&upload, &mut tracker, &mut artifacts).await;

            let report = artifacts.release().await;
            log_cleanup(&report);

            match result {
                Ok(outcome) => {
                    tracker.advance(RunStage::CleanedUp);
                    tracker.advance(RunStage::Done);
                    info!("Successfully processed audio file");
                    Ok(outcome)
                }
                Err(err) => {
                    tracker.fail(err.failed_at(), &err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        upload: &UploadedAudio,
        tracker: &mut RunTracker,
        artifacts: &mut RunArtifacts,
    ) -> Result<PipelineOutcome, PipelineError> {
        let metadata = self.validator.validate(&upload.bytes, &upload.original_name)?;
        tracker.advance(RunStage::Validated);

        let original = self
            .store
            .save(&upload.bytes, &upload.original_name)
            .await
            .map_err(PipelineError::Persist)?;
        artifacts.track(original.path.clone());
        tracker.advance(RunStage::Persisted);

        let transcription = self.process(&original, tracker, artifacts).await?;

        self.sink
            .save(&transcription.text)
            .await
            .map_err(PipelineError::TranscriptSave)?;
        tracker.advance(RunStage::TranscriptSaved);

        Ok(PipelineOutcome {
            metadata,
            transcription,
            original_file: OriginalFileInfo {
                name: upload.original_name.clone(),
                size: upload.declared_size,
                mime_type: upload.declared_mime_type.clone(),
            },
        })
    }

    /// Normalize, re-read, and transcribe a persisted upload.
    async fn process(
        &self,
        original: &PersistedFile,
        tracker: &mut RunTracker,
        artifacts: &mut RunArtifacts,
    ) -> Result<TranscriptionResult, ProcessingError> {
        if !self.normalizer.is_available().await {
            return Err(NormalizeError::Unavailable.into());
        }

        // A failed or interrupted conversion may still leave a partial file behind
        artifacts.expect(Normalizer::output_path_for(&original.path));
        let conversion = self
            .normalizer
            .to_canonical_wav(&original.path, None, None)
            .await?;
        artifacts.track(conversion.output_path.clone());
        tracker.advance(RunStage::Normalized);

        let canonical = self.reader.read_to_buffer(&conversion.output_path).await?;
        debug!(
            path = %conversion.output_path.display(),
            bytes = canonical.len(),
            "Canonical audio loaded"
        );
        tracker.advance(RunStage::ReRead);

        let transcription = self.transcriber.transcribe(&canonical).await?;
        tracker.advance(RunStage::Transcribed);

        Ok(transcription)
    }
}

fn log_cleanup(report: &BatchRemovalReport) {
    if report.is_clean() {
        debug!(removed = report.removed, "Temporary files cleaned up");
        return;
    }
    for failure in &report.failed {
        warn!(
            path = %failure.path.display(),
            error = failure.error.as_deref().unwrap_or("unknown"),
            "Temporary file cleanup failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{EncodingTag, TranscodeError, TranscodeJob, TranscodeObserver, Transcoder};
    use crate::config::SpeechConfig;
    use crate::storage::{FileTranscriptSink, StorageError};
    use crate::transcription::types::{RecognizeRequest, RecognizeResponse, SpeechAlternative, SpeechRecognitionResult};
    use crate::transcription::{RecognitionConfig, SpeechApiError, SpeechRecognizer, TranscriptionError};
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn wav_bytes(sample_rate: u32, samples: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..samples {
                writer.write_sample(((i % 64) as i16 - 32) * 200).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[derive(Clone, Copy, PartialEq)]
    enum TranscoderMode {
        Convert,
        Unavailable,
        FailAfterPartialWrite,
        Hang,
    }

    /// Writes a small 16 kHz WAV as the "converted" output.
    struct FakeTranscoder {
        mode: TranscoderMode,
        calls: AtomicUsize,
    }

    impl FakeTranscoder {
        fn new(mode: TranscoderMode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        fn name(&self) -> &str {
            "fake"
        }

        async fn is_available(&self) -> bool {
            self.mode != TranscoderMode::Unavailable
        }

        async fn transcode(
            &self,
            _input: &Path,
            output: &Path,
            _job: &TranscodeJob,
            _observer: &dyn TranscodeObserver,
        ) -> Result<(), TranscodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::write(output, wav_bytes(16_000, 1_600)).await.unwrap();
            match self.mode {
                TranscoderMode::FailAfterPartialWrite => Err(TranscodeError::Failed {
                    program: "fake".into(),
                    status: "exit status: 1".into(),
                    stderr: "Conversion failed!".into(),
                }),
                TranscoderMode::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    /// Answers with a fixed transcript and records what the temp dir held
    /// while the request was in flight.
    struct FakeRecognizer {
        temp_dir: PathBuf,
        fail: bool,
        calls: AtomicUsize,
        files_during_call: Mutex<Vec<String>>,
    }

    impl FakeRecognizer {
        fn new(temp_dir: &Path, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                temp_dir: temp_dir.to_path_buf(),
                fail,
                calls: AtomicUsize::new(0),
                files_during_call: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SpeechRecognizer for FakeRecognizer {
        async fn recognize(&self, _request: &RecognizeRequest) -> Result<RecognizeResponse, SpeechApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.files_during_call.lock().unwrap() = file_names(&self.temp_dir);

            if self.fail {
                return Err(SpeechApiError::Status {
                    status: 500,
                    message: "internal".into(),
                });
            }
            Ok(RecognizeResponse {
                results: vec![SpeechRecognitionResult {
                    alternatives: vec![SpeechAlternative {
                        transcript: "перевірка звʼязку".into(),
                        confidence: Some(0.88),
                        words: vec![],
                    }],
                    language_code: Some("uk-ua".into()),
                }],
            })
        }
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    struct Harness {
        _root: TempDir,
        temp_dir: PathBuf,
        transcript_path: PathBuf,
        transcoder: Arc<FakeTranscoder>,
        recognizer: Arc<FakeRecognizer>,
        pipeline: AudioPipeline,
    }

    fn harness(mode: TranscoderMode, recognizer_fails: bool) -> Harness {
        let root = TempDir::new().unwrap();
        let temp_dir = root.path().join("tmp");
        let transcript_path = root.path().join("transcripts").join("transcription.txt");
        let transcoder = FakeTranscoder::new(mode);
        let recognizer = FakeRecognizer::new(&temp_dir, recognizer_fails);

        let pipeline = AudioPipeline::new(
            FileStore::new(&temp_dir),
            Normalizer::new(transcoder.clone(), "uk-UA"),
            Transcriber::new(
                recognizer.clone(),
                RecognitionConfig::from_settings(&SpeechConfig::default()),
            ),
            Arc::new(FileTranscriptSink::new(&transcript_path)),
        );

        Harness {
            _root: root,
            temp_dir,
            transcript_path,
            transcoder,
            recognizer,
            pipeline,
        }
    }

    fn upload(bytes: Vec<u8>, name: &str) -> UploadedAudio {
        UploadedAudio {
            declared_size: bytes.len(),
            bytes: Bytes::from(bytes),
            original_name: name.to_string(),
            declared_mime_type: "audio/wav".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_run_reports_and_cleans_up() {
        let h = harness(TranscoderMode::Convert, false);
        // Two seconds of mono 44.1 kHz audio
        let bytes = wav_bytes(44_100, 88_200);
        let size = bytes.len();

        let outcome = h.pipeline.run(upload(bytes, "sample.wav")).await.unwrap();

        assert_eq!(outcome.transcription.text, "перевірка звʼязку");
        assert_eq!(outcome.transcription.confidence, Some(0.88));
        assert_eq!(outcome.metadata.encoding, EncodingTag::Linear16);
        assert_eq!(outcome.metadata.sample_rate, 44_100);
        assert_eq!(outcome.metadata.mime_type, "audio/wav");
        assert_eq!(
            outcome.original_file,
            OriginalFileInfo {
                name: "sample.wav".into(),
                size,
                mime_type: "audio/wav".into(),
            }
        );

        // Original and canonical both existed while the service was called
        let during = h.recognizer.files_during_call.lock().unwrap().clone();
        assert_eq!(during.len(), 2);
        assert_eq!(during.iter().filter(|n| n.ends_with("_speech.wav")).count(), 1);

        assert!(file_names(&h.temp_dir).is_empty());
        assert_eq!(
            std::fs::read_to_string(&h.transcript_path).unwrap(),
            "перевірка звʼязку"
        );
    }

    #[tokio::test]
    async fn test_empty_upload_fails_before_touching_disk() {
        let h = harness(TranscoderMode::Convert, false);

        let err = h.pipeline.run(upload(Vec::new(), "memo.wav")).await.unwrap_err();

        assert!(matches!(err, PipelineError::Intake(crate::audio::IntakeError::EmptyBuffer)));
        assert_eq!(err.failed_at(), RunStage::Received);
        assert!(!h.temp_dir.exists());
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_transcoder_skips_recognition() {
        let h = harness(TranscoderMode::Unavailable, false);

        let err = h
            .pipeline
            .run(upload(wav_bytes(16_000, 1_600), "memo.wav"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Processing(ProcessingError::Normalize(NormalizeError::Unavailable))
        ));
        assert_eq!(err.failed_at(), RunStage::Persisted);
        assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 0);
        assert!(file_names(&h.temp_dir).is_empty());
        assert!(!h.transcript_path.exists());
    }

    #[tokio::test]
    async fn test_partial_conversion_output_is_removed() {
        let h = harness(TranscoderMode::FailAfterPartialWrite, false);

        let err = h
            .pipeline
            .run(upload(wav_bytes(16_000, 1_600), "memo.wav"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Processing(ProcessingError::Normalize(NormalizeError::ConversionFailed(_)))
        ));
        assert!(file_names(&h.temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_recognition_failure_still_cleans_up() {
        let h = harness(TranscoderMode::Convert, true);

        let err = h
            .pipeline
            .run(upload(wav_bytes(16_000, 1_600), "memo.wav"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Processing(ProcessingError::Transcription(TranscriptionError::SpeechApi(_)))
        ));
        assert_eq!(err.failed_at(), RunStage::ReRead);
        assert!(file_names(&h.temp_dir).is_empty());
        assert!(!h.transcript_path.exists());
    }

    #[tokio::test]
    async fn test_transcript_save_failure_is_reported() {
        let h = harness(TranscoderMode::Convert, false);
        // A directory where the transcript file should go makes the rename fail
        std::fs::create_dir_all(&h.transcript_path).unwrap();

        let err = h
            .pipeline
            .run(upload(wav_bytes(16_000, 1_600), "memo.wav"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::TranscriptSave(StorageError::FileOperationFailed { .. })));
        assert_eq!(err.failed_at(), RunStage::Transcribed);
        assert!(file_names(&h.temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_no_files() {
        let h = harness(TranscoderMode::Hang, false);

        let run = h.pipeline.run(upload(wav_bytes(16_000, 1_600), "memo.wav"));
        let timed_out = tokio::time::timeout(Duration::from_millis(200), run).await;

        assert!(timed_out.is_err());
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 1);
        assert!(file_names(&h.temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_interfere() {
        let h = harness(TranscoderMode::Convert, false);

        let (a, b) = tokio::join!(
            h.pipeline.run(upload(wav_bytes(16_000, 1_600), "a.wav")),
            h.pipeline.run(upload(wav_bytes(22_050, 2_205), "b.wav")),
        );

        assert_eq!(a.unwrap().metadata.sample_rate, 16_000);
        assert_eq!(b.unwrap().metadata.sample_rate, 22_050);
        assert!(file_names(&h.temp_dir).is_empty());
    }

    #[tokio::test]
    async fn test_sweeps_skip_files_of_running_job() {
        let h = harness(TranscoderMode::Hang, false);
        let mut run = Box::pin(h.pipeline.run(upload(wav_bytes(16_000, 1_600), "memo.wav")));

        let sweep = async {
            while h.transcoder.calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;

            let store = h.pipeline.store();
            let by_pattern = store.remove_by_pattern(&h.temp_dir, "*").await.unwrap();
            let by_age = store
                .remove_older_than(&h.temp_dir, chrono::Utc::now() + chrono::Duration::minutes(1))
                .await
                .unwrap();
            (by_pattern, by_age, file_names(&h.temp_dir))
        };

        let (by_pattern, by_age, during) = tokio::select! {
            _ = &mut run => panic!("a hung conversion cannot finish"),
            swept = sweep => swept,
        };

        assert_eq!(by_pattern.total_files, 0);
        assert_eq!(by_age.total_files, 0);
        assert_eq!(during.len(), 2);
        assert_eq!(during.iter().filter(|n| n.ends_with("_speech.wav")).count(), 1);

        // Cancelling the run removes its files and releases the claims
        drop(run);
        assert!(file_names(&h.temp_dir).is_empty());
        for name in &during {
            assert!(!h.pipeline.store().is_claimed(&h.temp_dir.join(name)));
        }
    }

    #[tokio::test]
    async fn test_finished_run_releases_claims() {
        let h = harness(TranscoderMode::Convert, false);
        h.pipeline.run(upload(wav_bytes(16_000, 1_600), "memo.wav")).await.unwrap();

        let during = h.recognizer.files_during_call.lock().unwrap().clone();
        assert_eq!(during.len(), 2);
        for name in &during {
            assert!(!h.pipeline.store().is_claimed(&h.temp_dir.join(name)));
        }
    }
}
