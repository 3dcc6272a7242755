//! ffmpeg-backed [`Transcoder`].
//!
//! Runs the ffmpeg binary as a child process. Progress is requested on stdout
//! in `key=value` form (`-progress pipe:1`) and forwarded to the observer;
//! stderr is collected so a failed conversion can report why.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::normalizer::{TranscodeError, TranscodeJob, TranscodeObserver, TranscodeProgress, Transcoder};

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 12;

pub struct FfmpegTranscoder {
    program: PathBuf,
    display_name: String,
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        let program = program.into();
        let display_name = program.display().to_string();
        Self {
            program,
            display_name,
            timeout,
        }
    }

    /// Full argument list for one conversion.
    fn build_args(input: &Path, output: &Path, job: &TranscodeJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-nostats", "-y", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.into());

        if !job.audio_filters.is_empty() {
            args.push("-af".into());
            args.push(job.audio_filters.join(",").into());
        }

        args.extend(
            [
                "-ar".to_string(),
                job.sample_rate.to_string(),
                "-ac".to_string(),
                job.channels.to_string(),
                "-c:a".to_string(),
                job.codec.clone(),
                "-q:a".to_string(),
                "0".to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );

        if job.bitexact {
            args.push("-flags".into());
            args.push("+bitexact".into());
        }

        args.extend(["-progress", "pipe:1", "-f"].iter().map(OsString::from));
        args.push(job.format.clone().into());
        args.push(output.into());
        args
    }

    async fn run(
        &self,
        args: &[OsString],
        output: &Path,
        observer: &dyn TranscodeObserver,
    ) -> Result<(), TranscodeError> {
        let command_line = std::iter::once(self.display_name.clone())
            .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ");
        observer.on_start(&command_line);

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.display_name.clone(),
                source,
            })?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(collect_lossy(stderr));

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut out_time_secs = None;
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(progress) = parse_progress_line(&line, &mut out_time_secs) {
                    observer.on_progress(&progress);
                }
            }
        }

        let status = child.wait().await.map_err(|source| TranscodeError::Spawn {
            program: self.display_name.clone(),
            source,
        })?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(TranscodeError::Failed {
                program: self.display_name.clone(),
                status: status.to_string(),
                stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
            });
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(TranscodeError::MissingOutput(output.to_path_buf()));
        }

        observer.on_end(output);
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        &self.display_name
    }

    async fn is_available(&self) -> bool {
        let probe = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match probe {
            Ok(status) => status.success(),
            Err(e) => {
                debug!(program = %self.display_name, error = %e, "Transcoder probe failed");
                false
            }
        }
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        job: &TranscodeJob,
        observer: &dyn TranscodeObserver,
    ) -> Result<(), TranscodeError> {
        let args = Self::build_args(input, output, job);

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(&args, output, observer))
                .await
                .map_err(|_| TranscodeError::TimedOut {
                    program: self.display_name.clone(),
                    seconds: limit.as_secs(),
                })?,
            None => self.run(&args, output, observer).await,
        }
    }
}

/// Fold one `-progress` line into the running state; returns a report when a
/// block ends (`progress=continue` / `progress=end`).
fn parse_progress_line(line: &str, out_time_secs: &mut Option<f64>) -> Option<TranscodeProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            // ffmpeg reports both keys in microseconds
            if let Ok(micros) = value.parse::<i64>() {
                if micros >= 0 {
                    *out_time_secs = Some(micros as f64 / 1_000_000.0);
                }
            }
            None
        }
        "progress" => Some(TranscodeProgress {
            out_time_secs: *out_time_secs,
            finished: value == "end",
        }),
        _ => None,
    }
}

/// Drain a pipe into text. ffmpeg echoes raw tag bytes (often not UTF-8), so
/// decoding is lossy rather than all-or-nothing.
async fn collect_lossy<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut collected = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut collected).await;
    }
    String::from_utf8_lossy(&collected).into_owned()
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
