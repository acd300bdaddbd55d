//! Scheduler (C8): a single long-running worker thread that periodically
//! invokes the weight tuner, cooperative with the rest of the process.
//!
//! A dedicated worker thread uses `crossbeam_channel::Receiver::recv_timeout`
//! as its wait-with-cancellation primitive: no separate pipeline to
//! orchestrate, just a sleep-then-tune loop.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::logger::dual::{ActivityEvent, ActivityLoggerHandle};
use crate::risk::EnsemblePredictor;
use crate::store::OutcomeStore;
use crate::tuner::WeightTuner;

/// Handle to a running scheduler thread. Dropping this handle does not stop
/// the thread; call `shutdown` explicitly for a clean stop.
pub struct SchedulerHandle {
    shutdown_tx: Sender<()>,
    join_handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the worker to stop and wait for it to drain any in-flight
    /// tune. Returns once the thread has exited.
    pub fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.shutdown_tx.send(());
            let _ = handle.join();
        }
    }
}

/// Start the scheduler thread. Returns a `SchedulerHandle` for clean
/// shutdown. A shutdown request preempts sleeping between intervals and
/// returns control within at most one `recv_timeout` tick, which is bounded
/// well under a second in practice.
pub fn spawn(
    interval: Duration,
    store: Arc<dyn OutcomeStore>,
    predictor: Arc<EnsemblePredictor>,
    tuner: Arc<WeightTuner>,
    logger: ActivityLoggerHandle,
) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = bounded(1);

    let join_handle = std::thread::Builder::new()
        .name("drn-scheduler".to_string())
        .spawn(move || run(interval, &store, &predictor, &tuner, &logger, &shutdown_rx))
        .expect("failed to spawn scheduler thread");

    SchedulerHandle {
        shutdown_tx,
        join_handle: Some(join_handle),
    }
}

fn run(
    interval: Duration,
    store: &Arc<dyn OutcomeStore>,
    predictor: &Arc<EnsemblePredictor>,
    tuner: &Arc<WeightTuner>,
    logger: &ActivityLoggerHandle,
    shutdown_rx: &Receiver<()>,
) {
    let started_at = Instant::now();
    logger.send(ActivityEvent::SchedulerStarted {
        interval_secs: interval.as_secs(),
    });

    loop {
        match shutdown_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                logger.send(ActivityEvent::SchedulerStopped {
                    uptime_secs: started_at.elapsed().as_secs(),
                });
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                run_one_tick(store.as_ref(), predictor.as_ref(), tuner.as_ref(), logger);
            }
        }
    }
}

/// Run one tuning tick, logging and continuing on failure — the scheduler
/// never terminates the process because the tuner had a bad day.
fn run_one_tick(
    store: &dyn OutcomeStore,
    predictor: &EnsemblePredictor,
    tuner: &WeightTuner,
    logger: &ActivityLoggerHandle,
) {
    let start = Instant::now();
    match tuner.tune(store, predictor) {
        Ok(Some(result)) => {
            logger.send(ActivityEvent::TuneCompleted {
                heuristic_weight: result.new_heuristic_weight,
                ml_weight: result.new_ml_weight,
                samples_used: result.samples_used,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }
        Ok(None) => {
            logger.send(ActivityEvent::TuneSkipped {
                details: "a tune was already in flight".to_string(),
            });
        }
        Err(error) => {
            logger.send(ActivityEvent::Error {
                code: error.code().to_string(),
                message: error.to_string(),
            });
        }
    }
}
