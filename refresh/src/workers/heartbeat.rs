//! Heartbeat worker keeping the lease of a running refresh alive.
//!
//! A refresh can run for hours. While it does, this worker periodically stamps
//! `last_heartbeat_at` on the record so that the cleanup service can tell a slow run apart from a
//! run whose process died.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::record::RecordId;
use crate::store::BoxedHistoryStore;

/// Handle to a running heartbeat worker.
#[derive(Debug)]
pub struct HeartbeatWorkerHandle {
    stop_tx: ShutdownTx,
    join_handle: JoinHandle<()>,
}

impl HeartbeatWorkerHandle {
    /// Stops the worker and waits for it to exit.
    pub async fn stop(self) {
        // The worker may already be gone, in which case there is nobody left to signal.
        let _ = self.stop_tx.shutdown();

        if let Err(err) = self.join_handle.await {
            error!(error = %err, "heartbeat worker task panicked");
        }
    }
}

/// Worker stamping the heartbeat of a single record at a fixed interval.
pub struct HeartbeatWorker {
    record_id: RecordId,
    store: BoxedHistoryStore,
    interval: Duration,
    stop_rx: ShutdownRx,
    consecutive_failures: u32,
}

impl HeartbeatWorker {
    /// Starts the heartbeat worker in a background task.
    ///
    /// The first heartbeat is written one `interval` after the start, since creating or
    /// continuing a record already stamps it.
    pub fn start(
        record_id: RecordId,
        store: BoxedHistoryStore,
        interval: Duration,
    ) -> HeartbeatWorkerHandle {
        let (stop_tx, stop_rx) = create_shutdown_channel();

        let worker = HeartbeatWorker {
            record_id,
            store,
            interval,
            stop_rx,
            consecutive_failures: 0,
        };
        let join_handle = tokio::spawn(worker.run());

        HeartbeatWorkerHandle {
            stop_tx,
            join_handle,
        }
    }

    async fn run(mut self) {
        debug!(
            record_id = %self.record_id,
            interval_ms = self.interval.as_millis() as u64,
            "starting heartbeat worker"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.stop_rx.wait_for_shutdown() => {
                    debug!(record_id = %self.record_id, "heartbeat worker stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.emit_heartbeat().await;
                }
            }
        }
    }

    /// Writes a heartbeat, logging failures instead of propagating them.
    ///
    /// A missed heartbeat only shortens the lease, so it must never abort the run.
    async fn emit_heartbeat(&mut self) {
        match self.store.record_heartbeat(self.record_id).await {
            Ok(()) => {
                if self.consecutive_failures > 0 {
                    info!(
                        record_id = %self.record_id,
                        consecutive_failures = self.consecutive_failures,
                        "heartbeat recovered"
                    );
                }
                self.consecutive_failures = 0;
                debug!(record_id = %self.record_id, "heartbeat emitted");
            }
            Err(err) => {
                self.consecutive_failures += 1;
                warn!(
                    record_id = %self.record_id,
                    error = %err,
                    consecutive_failures = self.consecutive_failures,
                    "failed to emit heartbeat"
                );
            }
        }
    }
}
