//! Background event logger: a dedicated thread owns the `JsonlWriter` and
//! drains events sent from the rest of the process over a bounded channel.
//! `try_send` means callers are never blocked by logging back-pressure;
//! a `Shutdown` sentinel gives the thread a clean drain-and-exit path.
//!
//! This engine already persists its own analytical record of what happened
//! (deployment outcomes, `crate::store`), so events here are JSONL-only —
//! a second structured table for the same events would have no reader.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::core::errors::{DrnError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 1024;

/// Events the rest of the process can log through the background writer.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    AssessmentComputed {
        deployment_id: String,
        risk_score: f64,
        risk_level: String,
    },
    OutcomeRecorded {
        deployment_id: String,
        final_score: f64,
    },
    SyntheticContextUsed {
        deployment_id: String,
    },
    TuneCompleted {
        heuristic_weight: f64,
        ml_weight: f64,
        samples_used: usize,
        duration_ms: u64,
    },
    TuneSkipped {
        details: String,
    },
    SchedulerStarted {
        interval_secs: u64,
    },
    SchedulerStopped {
        uptime_secs: u64,
    },
    ConfigLoaded {
        config_hash: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Thread-safe, cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking; drops and counts
    /// the event rather than stalling the caller if the channel is full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of events dropped due to channel back-pressure.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown of the logger thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Options for building the background event logger.
#[derive(Debug, Clone)]
pub struct EventLoggerConfig {
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
}

impl Default for EventLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the logger thread and return a handle. The thread runs until
/// `handle.shutdown()` is called or every sender is dropped.
pub fn spawn_logger(
    config: EventLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("drn-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config.jsonl_config, &dropped_clone))
        .map_err(|error| DrnError::Internal {
            details: format!("failed to spawn logger thread: {error}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{lost} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
    jsonl.fsync();
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::AssessmentComputed {
            deployment_id,
            risk_score,
            risk_level,
        } => {
            let mut e = LogEntry::new(EventType::AssessmentComputed, Severity::Info);
            e.deployment_id = Some(deployment_id.clone());
            e.risk_score = Some(*risk_score);
            e.risk_level = Some(risk_level.clone());
            e
        }
        ActivityEvent::OutcomeRecorded {
            deployment_id,
            final_score,
        } => {
            let mut e = LogEntry::new(EventType::OutcomeRecorded, Severity::Info);
            e.deployment_id = Some(deployment_id.clone());
            e.risk_score = Some(*final_score);
            e
        }
        ActivityEvent::SyntheticContextUsed { deployment_id } => {
            let mut e = LogEntry::new(EventType::SyntheticContextUsed, Severity::Warning);
            e.deployment_id = Some(deployment_id.clone());
            e
        }
        ActivityEvent::TuneCompleted {
            heuristic_weight,
            ml_weight,
            samples_used,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::TuneCompleted, Severity::Info);
            e.heuristic_weight = Some(*heuristic_weight);
            e.ml_weight = Some(*ml_weight);
            e.samples_used = Some(*samples_used);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::TuneSkipped { details } => {
            let mut e = LogEntry::new(EventType::TuneSkipped, Severity::Info);
            e.details = Some(details.clone());
            e
        }
        ActivityEvent::SchedulerStarted { interval_secs } => {
            let mut e = LogEntry::new(EventType::SchedulerStarted, Severity::Info);
            e.details = Some(format!("interval_secs={interval_secs}"));
            e
        }
        ActivityEvent::SchedulerStopped { uptime_secs } => {
            let mut e = LogEntry::new(EventType::SchedulerStopped, Severity::Info);
            e.details = Some(format!("uptime_secs={uptime_secs}"));
            e
        }
        ActivityEvent::ConfigLoaded { config_hash } => {
            let mut e = LogEntry::new(EventType::ConfigLoaded, Severity::Info);
            e.details = Some(format!("config_hash={config_hash}"));
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::SchedulerStopped, Severity::Info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> EventLoggerConfig {
        EventLoggerConfig {
            jsonl_config: JsonlConfig {
                path: dir.join("test.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: 64,
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        handle.send(ActivityEvent::ConfigLoaded {
            config_hash: "abc123".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert!(!contents.is_empty());
        assert!(contents.contains("config_loaded"));
    }

    #[test]
    fn multiple_events_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();

        handle.send(ActivityEvent::AssessmentComputed {
            deployment_id: "d1".to_string(),
            risk_score: 42.0,
            risk_level: "moderate".to_string(),
        });
        handle.send(ActivityEvent::OutcomeRecorded {
            deployment_id: "d1".to_string(),
            final_score: 50.0,
        });
        handle.send(ActivityEvent::TuneCompleted {
            heuristic_weight: 0.6,
            ml_weight: 0.4,
            samples_used: 10,
            duration_ms: 5,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn handles_are_cloneable_and_send() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        let second = handle.clone();

        handle.send(ActivityEvent::SchedulerStarted { interval_secs: 300 });
        second.send(ActivityEvent::SchedulerStopped { uptime_secs: 10 });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn dropped_events_counter_initializes_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = EventLoggerConfig {
            jsonl_config: JsonlConfig {
                path: dir.path().join("drop.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: 2,
        };
        let (handle, _join) = spawn_logger(config).unwrap();
        assert_eq!(handle.dropped_events(), 0);
        handle.shutdown();
    }

    #[test]
    fn error_event_marked_critical_and_not_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        handle.send(ActivityEvent::Error {
            code: "DRN-3002".to_string(),
            message: "sql failure".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert!(contents.contains("\"severity\":\"critical\""));
        assert!(contents.contains("DRN-3002"));
    }
}
