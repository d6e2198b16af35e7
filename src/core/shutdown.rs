use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::core::export::{ExportEngine, ExportSummary};
use crate::platform::ShutdownSignals;

/// Work performed once when the process is asked to stop.
#[async_trait]
pub trait ShutdownTask: Send + Sync {
    type Output: Send;

    async fn run(&self) -> Self::Output;
}

#[async_trait]
impl ShutdownTask for ExportEngine {
    type Output = ExportSummary;

    async fn run(&self) -> ExportSummary {
        ExportEngine::run(self).await
    }
}

#[derive(Debug)]
pub enum TriggerOutcome<O> {
    Completed(O),
    AlreadyRunning,
}

/// Runs the shutdown task at most once at a time. A trigger that arrives
/// while the task is in flight is refused rather than started alongside it,
/// so two exports never race on the same snapshot files.
pub struct ShutdownCoordinator<T: ShutdownTask> {
    task: T,
    in_flight: AtomicBool,
}

impl<T: ShutdownTask> ShutdownCoordinator<T> {
    pub fn new(task: T) -> Self {
        Self {
            task,
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn trigger(&self) -> TriggerOutcome<T::Output> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return TriggerOutcome::AlreadyRunning;
        }
        let output = self.task.run().await;
        self.in_flight.store(false, Ordering::SeqCst);
        TriggerOutcome::Completed(output)
    }

    /// Blocks until the first shutdown signal, then runs the task to
    /// completion. Signals delivered meanwhile are logged and dropped; the
    /// task cannot be cancelled once started.
    pub async fn run_until_signal(
        &self,
        signals: &mut ShutdownSignals,
    ) -> TriggerOutcome<T::Output> {
        let first = signals.recv().await;
        info!(signal = first, "Shutdown requested; running final export");

        let flush = self.trigger();
        tokio::pin!(flush);
        loop {
            tokio::select! {
                outcome = &mut flush => return outcome,
                again = signals.recv() => {
                    warn!(signal = again, "Export already in progress; ignoring signal");
                }
            }
        }
    }
}
