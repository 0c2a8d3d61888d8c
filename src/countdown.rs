// src/countdown.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::AttemptEngine;
use crate::error::EngineError;

/// Per-attempt countdown driver.
///
/// Each attached attempt gets its own tick task with an explicit handle, so
/// attempt lifetimes stay independent and testable; there is no shared
/// global timer. Attaching two schedulers to the same attempt is a caller
/// error this type cannot see.
pub struct CountdownScheduler {
    engine: Arc<AttemptEngine>,
}

/// Handle for one attached countdown. Detach it to stop ticking without
/// submitting; dropping it without detaching leaves the countdown running
/// to expiry.
pub struct CountdownHandle {
    attempt_id: i64,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn attempt_id(&self) -> i64 {
        self.attempt_id
    }
}

impl CountdownScheduler {
    pub fn new(engine: Arc<AttemptEngine>) -> Self {
        Self { engine }
    }

    /// Starts a one-second tick task for the attempt.
    ///
    /// Every `sync_cadence_ticks`-th tick flushes the counter through the
    /// engine; losing up to a cadence worth of countdown precision on a
    /// crash is the accepted tradeoff. At zero the attempt is expired
    /// exactly once and ticking stops. A failed periodic flush is logged
    /// and ticking continues; the local counter stays authoritative.
    pub fn attach(&self, attempt_id: i64, initial_seconds: i64) -> CountdownHandle {
        let cadence = i64::from(self.engine.config().sync_cadence_ticks.max(1));
        let engine = self.engine.clone();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut remaining = initial_seconds;
            let mut ticks: i64 = 0;
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately; consume it so the
            // countdown starts a full second out.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        remaining -= 1;
                        ticks += 1;

                        if remaining <= 0 {
                            match engine.expire(attempt_id).await {
                                Ok(_) => {
                                    tracing::info!(attempt_id, "countdown expired, attempt timed out");
                                }
                                Err(EngineError::InvalidState { .. }) => {
                                    // Manual submit won the race; nothing to do.
                                    tracing::debug!(attempt_id, "countdown expiry skipped, attempt already finalized");
                                }
                                Err(e) => {
                                    tracing::error!(attempt_id, "countdown expiry failed: {}", e);
                                }
                            }
                            break;
                        }

                        if ticks % cadence == 0 {
                            if let Err(e) = engine.sync_remaining_time(attempt_id, remaining).await {
                                tracing::warn!(
                                    attempt_id,
                                    remaining,
                                    "periodic time sync failed, countdown continues: {}",
                                    e
                                );
                            }
                        }
                    }
                    _ = stop_rx.changed() => {
                        // Detached: flush the counter, do not submit.
                        if remaining > 0 {
                            if let Err(e) = engine.sync_remaining_time(attempt_id, remaining).await {
                                tracing::debug!(attempt_id, "final time sync on detach failed: {}", e);
                            }
                        }
                        break;
                    }
                }
            }
        });

        tracing::debug!(attempt_id, initial_seconds, "countdown attached");
        CountdownHandle {
            attempt_id,
            stop: stop_tx,
            task,
        }
    }

    /// Stops ticking without submitting, flushing the remaining time first.
    ///
    /// Safe to call after the countdown has already expired and
    /// auto-submitted; it is then a no-op, not an error.
    pub async fn detach(&self, handle: CountdownHandle) {
        // Send fails only when the task already finished; that is fine.
        let _ = handle.stop.send(true);
        if let Err(e) = handle.task.await {
            tracing::warn!(
                attempt_id = handle.attempt_id,
                "countdown task ended abnormally: {}",
                e
            );
        }
        tracing::debug!(attempt_id = handle.attempt_id, "countdown detached");
    }
}
