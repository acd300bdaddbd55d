//! JSONL logger: append-only line-delimited JSON for agent-friendly log consumption.
//!
//! Each line is a self-contained JSON object. Lines are assembled in memory and
//! written atomically via `write_all` to prevent interleaved partial lines when
//! the file is being tailed by another process.
//!
//! Four-level fallback chain:
//! 1. Primary file path
//! 2. Fallback path (e.g. `/dev/shm/drn.jsonl` for RAM-backed fallback)
//! 3. stderr with `[DRN-JSONL]` prefix
//! 4. Silent discard (the engine must never fail a request for logging failures)

#![allow(missing_docs)]

use std::fs::{self, rename, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DrnError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Log event types for the deployment-risk engine's own activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AssessmentComputed,
    OutcomeRecorded,
    SyntheticContextUsed,
    TuneCompleted,
    TuneSkipped,
    SchedulerStarted,
    SchedulerStopped,
    ConfigLoaded,
    Error,
}

/// A single JSONL log entry — all fields optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Event type identifier.
    pub event: EventType,
    /// Severity level.
    pub severity: Severity,
    /// Deployment id involved, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    /// Risk score at time of event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    /// Risk band label at time of event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    /// New heuristic weight, for tune events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heuristic_weight: Option<f64>,
    /// New ml weight, for tune events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_weight: Option<f64>,
    /// Outcome samples used by a tune pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples_used: Option<usize>,
    /// Duration of the action in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Whether the action succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// DRN error code if the action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            deployment_id: None,
            risk_score: None,
            risk_level: None,
            heuristic_weight: None,
            ml_weight: None,
            samples_used: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// Writing to primary path.
    Normal,
    /// Primary failed, writing to fallback path.
    Fallback,
    /// Both files failed, writing to stderr.
    Stderr,
    /// Everything failed, silently discarding.
    Discard,
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Optional fallback path (e.g. on a different filesystem).
    pub fallback_path: Option<PathBuf>,
    /// Maximum file size before rotation (bytes). Default: 100 MiB.
    pub max_size_bytes: u64,
    /// Number of rotated files to keep. Default: 5.
    pub max_rotated_files: u32,
    /// Seconds between forced fsync calls. Default: 10.
    pub fsync_interval_secs: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/drn/events.jsonl"),
            fallback_path: Some(PathBuf::from("/dev/shm/drn.jsonl")),
            max_size_bytes: 100 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
        }
    }
}

/// Append-only JSONL log writer with rotation and multi-level fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
    last_fsync: SystemTime,
    lines_since_fsync: u64,
}

impl JsonlWriter {
    /// Open the JSONL log file. Falls through the degradation chain on failure.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
            last_fsync: SystemTime::now(),
            lines_since_fsync: 0,
        };
        writer.try_open_primary();
        writer
    }

    /// Write a single log entry as one atomic JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(error) => {
                let _ = writeln!(io::stderr(), "[DRN-JSONL] serialize error: {error}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Flush buffers.
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }

    /// Force an fsync on the underlying file.
    pub fn fsync(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
            let _ = writer.get_ref().sync_data();
            self.last_fsync = SystemTime::now();
            self.lines_since_fsync = 0;
        }
    }

    /// Current degradation state.
    #[must_use]
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Fallback => "fallback",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    /// Number of bytes written to the current file.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Attempt recovery: try reopening the primary path. Call periodically
    /// (e.g. every 60s) when degraded to return to normal.
    pub fn try_recover(&mut self) {
        if self.state == WriterState::Normal {
            return;
        }
        if let Ok((file, size)) = open_append(&self.config.path) {
            self.writer = Some(BufWriter::with_capacity(64 * 1024, file));
            self.state = WriterState::Normal;
            self.bytes_written = size;
            let _ = writeln!(
                io::stderr(),
                "[DRN-JSONL] recovered to primary path: {}",
                self.config.path.display()
            );
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.bytes_written + line.len() as u64 > self.config.max_size_bytes
            && matches!(self.state, WriterState::Normal | WriterState::Fallback)
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal | WriterState::Fallback => {
                if let Some(writer) = self.writer.as_mut() {
                    if writer.write_all(line.as_bytes()).is_err() {
                        self.degrade();
                        self.write_line(line);
                        return;
                    }
                    self.bytes_written += line.len() as u64;
                    self.lines_since_fsync += 1;
                    self.maybe_fsync();
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[DRN-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn maybe_fsync(&mut self) {
        let elapsed = SystemTime::now()
            .duration_since(self.last_fsync)
            .unwrap_or(Duration::ZERO);
        if elapsed.as_secs() >= self.config.fsync_interval_secs {
            self.fsync();
        }
    }

    fn try_open_primary(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.writer = Some(BufWriter::with_capacity(64 * 1024, file));
                self.state = WriterState::Normal;
                self.bytes_written = size;
            }
            Err(_) => self.try_open_fallback(),
        }
    }

    fn try_open_fallback(&mut self) {
        if let Some(fallback) = self.config.fallback_path.clone() {
            match open_append(&fallback) {
                Ok((file, size)) => {
                    let _ = writeln!(
                        io::stderr(),
                        "[DRN-JSONL] primary path failed, using fallback: {}",
                        fallback.display()
                    );
                    self.writer = Some(BufWriter::with_capacity(64 * 1024, file));
                    self.state = WriterState::Fallback;
                    self.bytes_written = size;
                }
                Err(_) => {
                    self.state = WriterState::Stderr;
                    let _ = writeln!(
                        io::stderr(),
                        "[DRN-JSONL] both primary and fallback paths failed, using stderr"
                    );
                }
            }
        } else {
            self.state = WriterState::Stderr;
            let _ = writeln!(
                io::stderr(),
                "[DRN-JSONL] primary path failed and no fallback configured, using stderr"
            );
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.state {
            WriterState::Normal => self.try_open_fallback(),
            WriterState::Fallback => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[DRN-JSONL] fallback write failed, using stderr"
                );
            }
            WriterState::Stderr => self.state = WriterState::Discard,
            WriterState::Discard => {}
        }
    }

    fn rotate(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
        self.writer = None;

        let base = match self.state {
            WriterState::Normal => self.config.path.clone(),
            WriterState::Fallback => match self.config.fallback_path.clone() {
                Some(path) => path,
                None => return,
            },
            _ => return,
        };

        for i in (1..self.config.max_rotated_files).rev() {
            let from = rotated_name(&base, i);
            let to = rotated_name(&base, i + 1);
            let _ = rename(&from, &to);
        }
        let oldest = rotated_name(&base, self.config.max_rotated_files);
        let _ = fs::remove_file(&oldest);
        let _ = rename(&base, &rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::with_capacity(64 * 1024, file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| DrnError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DrnError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
