//! Embedded subtitle extraction through an external ffmpeg process.
//!
//! The process reads the file back from this server's own stream endpoint
//! and writes its output next to a log file. Pollers only ever look at the
//! log, so the job survives independently of the request that started it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::SubtitleError;
use super::artifacts::ExtractionPaths;
use crate::session::SessionKey;

/// Appended to the log when the output file was produced.
pub const SUCCESS_MARKER: &str = "Extraction finished successfully.";
/// Appended to the log, followed by a reason, on any failure.
pub const FAILURE_MARKER: &str = "Extraction failed:";

/// Lifecycle of an extraction job. Written only by the job's monitor task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    Succeeded,
    Failed { reason: String },
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }
}

/// Latest ffmpeg progress line, field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionProgress {
    pub size: Option<String>,
    pub time: Option<String>,
    pub bitrate: Option<String>,
    pub speed: Option<String>,
}

impl ExtractionProgress {
    /// Parses lines like
    /// `size=      12kB time=00:01:02.00 bitrate=   1.6kbits/s speed= 124x`.
    pub fn from_ffmpeg_line(line: &str) -> Option<Self> {
        if !line.contains("size=") || !line.contains("time=") {
            return None;
        }

        Some(Self {
            size: extract_value(line, "size="),
            time: extract_value(line, "time="),
            bitrate: extract_value(line, "bitrate="),
            speed: extract_value(line, "speed="),
        })
    }
}

/// Job status as inferred from a log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Running { progress: Option<ExtractionProgress> },
    Succeeded,
    Failed { reason: String },
}

impl JobStatus {
    pub fn from_log(log: &str) -> Self {
        if log.contains(SUCCESS_MARKER) {
            return JobStatus::Succeeded;
        }

        if let Some(position) = log.rfind(FAILURE_MARKER) {
            let reason = log[position + FAILURE_MARKER.len()..]
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            return JobStatus::Failed { reason };
        }

        // ffmpeg rewrites its progress line with carriage returns
        let progress = log
            .split(['\r', '\n'])
            .rev()
            .find_map(ExtractionProgress::from_ffmpeg_line);
        JobStatus::Running { progress }
    }
}

fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)? + key.len();
    let rest = line[start..].trim_start();
    let value = rest.split_whitespace().next()?;
    Some(value.to_string())
}

/// Interval at which a monitor checks whether its process has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Process handle shared between the job table and the job's monitor.
/// Empty while the process is being launched and after eviction.
type ChildSlot = Arc<Mutex<Option<Child>>>;

struct JobEntry {
    paths: ExtractionPaths,
    state: watch::Receiver<JobState>,
    cancel: CancellationToken,
    child: ChildSlot,
}

/// Launches extraction processes and tracks them per `(session, file)`.
pub struct SubtitleExtractor {
    tool: String,
    stream_base_url: String,
    jobs: Mutex<HashMap<(SessionKey, usize), JobEntry>>,
}

impl SubtitleExtractor {
    pub fn new(tool: impl Into<String>, stream_base_url: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            stream_base_url: stream_base_url.into(),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Locates the extraction tool on `PATH`.
    ///
    /// # Errors
    /// - `SubtitleError::ToolUnavailable` - Tool not found or not executable
    pub fn verify_installation(&self) -> Result<PathBuf, SubtitleError> {
        which::which(&self.tool).map_err(|e| SubtitleError::ToolUnavailable {
            tool: self.tool.clone(),
            reason: e.to_string(),
        })
    }

    fn input_url(&self, descriptor_uri: &str, file_index: usize) -> String {
        format!(
            "{}/stream?url={}&index={}",
            self.stream_base_url,
            urlencoding::encode(descriptor_uri),
            file_index
        )
    }

    /// Starts an extraction job and returns immediately.
    ///
    /// A job already running for the same file, or output whose log records
    /// a successful run, is reused without launching anything.
    ///
    /// # Errors
    /// - `SubtitleError::ToolUnavailable` - Tool missing or failed to spawn
    /// - `SubtitleError::Io` - Log file could not be created
    pub fn start(
        &self,
        descriptor_uri: &str,
        key: &SessionKey,
        file_index: usize,
        paths: ExtractionPaths,
    ) -> Result<ExtractionPaths, SubtitleError> {
        let tool_path = self.verify_installation()?;
        let job_key = (key.clone(), file_index);

        if let Some(running) = self.running_job(&job_key) {
            tracing::debug!("Extraction for {} [{}] already running", key, file_index);
            return Ok(running);
        }

        if has_completed_output(&paths) {
            tracing::debug!(
                "Extraction output {} already complete, not relaunching",
                paths.output_name
            );
            return Ok(paths);
        }

        let (state_tx, state_rx) = watch::channel(JobState::Running);
        let cancel = CancellationToken::new();
        let child_slot: ChildSlot = Arc::new(Mutex::new(None));
        {
            let mut jobs = self.jobs.lock();
            if let Some(job) = jobs.get(&job_key)
                && job.state.borrow().is_running()
            {
                return Ok(job.paths.clone());
            }
            jobs.insert(
                job_key.clone(),
                JobEntry {
                    paths: paths.clone(),
                    state: state_rx,
                    cancel: cancel.clone(),
                    child: Arc::clone(&child_slot),
                },
            );
        }

        let child = match self.launch(&tool_path, descriptor_uri, key, file_index, &paths) {
            Ok(child) => child,
            Err(e) => {
                self.forget(&job_key, &child_slot);
                state_tx.send_replace(JobState::Failed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        *child_slot.lock() = Some(child);

        tokio::spawn(monitor_job(child_slot, paths.clone(), state_tx, cancel));

        Ok(paths)
    }

    /// Resets the log and stale output, then spawns the tool.
    fn launch(
        &self,
        tool_path: &Path,
        descriptor_uri: &str,
        key: &SessionKey,
        file_index: usize,
        paths: &ExtractionPaths,
    ) -> Result<Child, SubtitleError> {
        let io_error = |path: &PathBuf| {
            let path = path.clone();
            move |source| SubtitleError::Io { path, source }
        };

        for stale in [&paths.log_path, &paths.output_path] {
            match std::fs::remove_file(stale) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(stale)(e)),
            }
        }
        let log_file = std::fs::File::create(&paths.log_path).map_err(io_error(&paths.log_path))?;
        let stderr_log = log_file.try_clone().map_err(io_error(&paths.log_path))?;

        let input_url = self.input_url(descriptor_uri, file_index);
        let mut command = Command::new(tool_path);
        command
            .arg("-y")
            .arg("-i")
            .arg(&input_url)
            .arg("-map")
            .arg("0:s:0")
            .arg("-c")
            .arg("copy")
            .arg(&paths.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_log))
            .kill_on_drop(true);

        tracing::info!(
            "Starting subtitle extraction for {} [{}]: {} -y -i {} -map 0:s:0 -c copy {}",
            key,
            file_index,
            tool_path.display(),
            input_url,
            paths.output_path.display()
        );

        command.spawn().map_err(|e| SubtitleError::ToolUnavailable {
            tool: self.tool.clone(),
            reason: e.to_string(),
        })
    }

    fn running_job(&self, job_key: &(SessionKey, usize)) -> Option<ExtractionPaths> {
        self.jobs
            .lock()
            .get(job_key)
            .filter(|job| job.state.borrow().is_running())
            .map(|job| job.paths.clone())
    }

    /// Drops the entry for `job_key` if it still belongs to `child_slot`.
    fn forget(&self, job_key: &(SessionKey, usize), child_slot: &ChildSlot) {
        let mut jobs = self.jobs.lock();
        if jobs
            .get(job_key)
            .is_some_and(|job| Arc::ptr_eq(&job.child, child_slot))
        {
            jobs.remove(job_key);
        }
    }

    /// Current state of a tracked job.
    pub fn job_state(&self, key: &SessionKey, file_index: usize) -> Option<JobState> {
        self.jobs
            .lock()
            .get(&(key.clone(), file_index))
            .map(|job| job.state.borrow().clone())
    }

    /// Receiver that observes state changes of a tracked job.
    pub fn subscribe(&self, key: &SessionKey, file_index: usize) -> Option<watch::Receiver<JobState>> {
        self.jobs
            .lock()
            .get(&(key.clone(), file_index))
            .map(|job| job.state.clone())
    }

    /// Forgets every job of a session and kills those still running.
    ///
    /// The kill signal is sent before this returns, so a killed process
    /// can no longer write into files the caller is about to delete.
    pub fn cancel_session(&self, key: &SessionKey) -> usize {
        let cancelled: Vec<JobEntry> = {
            let mut jobs = self.jobs.lock();
            let job_keys: Vec<_> = jobs.keys().filter(|(k, _)| k == key).cloned().collect();
            job_keys.iter().filter_map(|k| jobs.remove(k)).collect()
        };

        for job in &cancelled {
            if let Some(child) = job.child.lock().as_mut()
                && let Err(e) = child.start_kill()
            {
                tracing::debug!("Extraction {} not killed: {}", job.paths.output_name, e);
            }
            job.cancel.cancel();
        }
        cancelled.len()
    }
}

/// Output counts as reusable only when its log records a successful run.
fn has_completed_output(paths: &ExtractionPaths) -> bool {
    let output_present =
        std::fs::metadata(&paths.output_path).is_ok_and(|m| m.is_file() && m.len() > 0);
    output_present
        && std::fs::read_to_string(&paths.log_path)
            .is_ok_and(|log| JobStatus::from_log(&log) == JobStatus::Succeeded)
}

async fn monitor_job(
    child: ChildSlot,
    paths: ExtractionPaths,
    state: watch::Sender<JobState>,
    cancel: CancellationToken,
) {
    let mut poll = tokio::time::interval(EXIT_POLL_INTERVAL);
    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                discard_evicted(&child, &paths).await;
                state.send_replace(JobState::Failed {
                    reason: "session evicted".to_string(),
                });
                return;
            }
            _ = poll.tick() => {
                let exited = child.lock().as_mut().map(Child::try_wait);
                match exited {
                    Some(Ok(Some(status))) => break exit_outcome(status, &paths).await,
                    Some(Ok(None)) | None => {}
                    Some(Err(e)) => break JobState::Failed {
                        reason: format!("failed waiting for process: {e}"),
                    },
                }
            }
        }
    };

    let marker = match &outcome {
        JobState::Succeeded => {
            tracing::info!("Subtitle extraction finished: {}", paths.output_name);
            format!("\n\n{SUCCESS_MARKER}")
        }
        JobState::Failed { reason } => {
            tracing::warn!("Subtitle extraction {} failed: {}", paths.output_name, reason);
            format!("\n\n{FAILURE_MARKER} {reason}")
        }
        JobState::Running => String::new(),
    };

    // Never recreate a log that eviction already deleted
    match tokio::fs::OpenOptions::new()
        .append(true)
        .open(&paths.log_path)
        .await
    {
        Ok(mut log) => {
            if let Err(e) = log.write_all(marker.as_bytes()).await {
                tracing::warn!("Failed to append to {}: {}", paths.log_name, e);
            }
        }
        Err(e) => tracing::debug!("Log {} not updated: {}", paths.log_name, e),
    }

    state.send_replace(outcome);
}

async fn exit_outcome(status: ExitStatus, paths: &ExtractionPaths) -> JobState {
    if !status.success() {
        return JobState::Failed {
            reason: format!("process exited with {status}"),
        };
    }

    match tokio::fs::metadata(&paths.output_path).await {
        Ok(metadata) if metadata.len() > 0 => JobState::Succeeded,
        _ => JobState::Failed {
            reason: "Output file is missing or empty.".to_string(),
        },
    }
}

/// Kills an evicted job's process and removes whatever it left behind,
/// including files created after the session's artifacts were cleaned.
async fn discard_evicted(child: &ChildSlot, paths: &ExtractionPaths) {
    let taken = child.lock().take();
    if let Some(mut child) = taken
        && let Err(e) = child.start_kill()
    {
        tracing::debug!("Extraction {} already exited: {}", paths.output_name, e);
    }

    for path in [&paths.output_path, &paths.log_path] {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Removed evicted extraction file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}
