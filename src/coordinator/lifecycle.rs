//! Coordinator lifecycle: start, stop, run loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::write_op::WriteOperation;

use super::{CoordinatorError, CoordinatorState, DedupCoordinator};

impl<W: WriteOperation> DedupCoordinator<W> {
    /// Spawn the poll loop on the current tokio runtime.
    ///
    /// Fails when the coordinator is not `Stopped` or when called outside a
    /// runtime. The returned handle completes once the loop has exited after
    /// [`stop()`](Self::stop).
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, CoordinatorError> {
        let handle = Handle::try_current().map_err(|_| CoordinatorError::NoRuntime)?;

        let mut observed = CoordinatorState::Stopped;
        let started = self.state.send_if_modified(|state| {
            observed = *state;
            if *state == CoordinatorState::Stopped {
                *state = CoordinatorState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(CoordinatorError::NotStopped(observed));
        }

        self.shutdown.send_replace(false);
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            grace_window_ms = self.config.query_duration_ms,
            document_limit = self.config.query_async_document_limit,
            "Starting dedup coordinator"
        );
        Ok(handle.spawn(Arc::clone(self).run()))
    }

    /// Ask the loop to exit.
    ///
    /// Returns immediately. A cycle already querying runs to completion; the
    /// loop exits at its next stop check. Blocked `drain_ready` calls return
    /// whatever is ready.
    pub fn stop(&self) {
        let stopping = self.state.send_if_modified(|state| {
            if *state == CoordinatorState::Running {
                *state = CoordinatorState::Stopping;
                true
            } else {
                false
            }
        });
        self.shutdown.send_replace(true);
        if stopping {
            info!("Stopping dedup coordinator");
        }
    }

    #[tracing::instrument(skip(self))]
    async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        info!("Dedup coordinator running");

        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }

            if !self.pending.is_empty() {
                match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                    Ok(Ok(report)) => debug!(
                        queries = report.queries,
                        dropped = report.dropped,
                        promoted = report.promoted,
                        "Cycle finished"
                    ),
                    Ok(Err(e)) => warn!(error = %e, "Query cycle failed, retrying next interval"),
                    Err(_) => error!("Query cycle panicked, retrying next interval"),
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("Poll sleep interrupted by stop request");
                }
            }
        }

        self.state.send_replace(CoordinatorState::Stopped);
        info!(
            pending = self.pending.len(),
            ready = self.ready.len(),
            "Dedup coordinator stopped"
        );
    }
}
