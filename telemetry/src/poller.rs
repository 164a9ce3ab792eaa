//! Snapshot poller - periodic pull of run metadata and recent pages.
//!
//! Runs beside the event stream, never inside it. Each cycle fetches both
//! resources concurrently and hands every result, success or failure, to the
//! view actor, which decides how to merge it. Results that resolve after the
//! view was cancelled are dropped here.

use std::sync::Arc;
use std::time::Duration;

use ractor::ActorRef;
use shared_types::RunId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::RunBackend;
use crate::run_view::RunViewMsg;

/// What happened to one fetch of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Delivered,
    /// The fetch failed; the failure was still handed to the view
    Failed,
    /// The view was gone or cancelled by the time the fetch resolved
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub run: FetchOutcome,
    pub pages: FetchOutcome,
}

pub struct SnapshotPoller {
    backend: Arc<dyn RunBackend>,
    run_id: RunId,
    interval: Duration,
    pages_limit: usize,
    cancel: CancellationToken,
}

impl SnapshotPoller {
    pub fn new(
        backend: Arc<dyn RunBackend>,
        run_id: RunId,
        interval: Duration,
        pages_limit: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            run_id,
            interval: interval.max(Duration::from_millis(100)),
            pages_limit,
            cancel,
        }
    }

    pub fn spawn(self, view: ActorRef<RunViewMsg>) -> JoinHandle<()> {
        tokio::spawn(self.run(view))
    }

    /// Poll immediately, then once per interval, until cancelled.
    pub async fn run(self, view: ActorRef<RunViewMsg>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = self.poll_once(&view) => outcome,
            };
            if outcome.run == FetchOutcome::Discarded && outcome.pages == FetchOutcome::Discarded {
                break;
            }
        }

        tracing::debug!(run_id = %self.run_id, "Snapshot poller finished");
    }

    /// One poll cycle. The two fetches are independent: a slow or failing
    /// one never holds back the other's delivery.
    pub async fn poll_once(&self, view: &ActorRef<RunViewMsg>) -> PollOutcome {
        let (run, pages) = tokio::join!(self.poll_run(view), self.poll_pages(view));
        PollOutcome { run, pages }
    }

    async fn poll_run(&self, view: &ActorRef<RunViewMsg>) -> FetchOutcome {
        let cancel = self.cancel.clone();
        let result = self.backend.get_run(&self.run_id).await;
        if cancel.is_cancelled() {
            tracing::debug!(run_id = %self.run_id, "Discarding run poll after cancellation");
            return FetchOutcome::Discarded;
        }

        let outcome = match &result {
            Ok(_) => FetchOutcome::Delivered,
            Err(e) => {
                tracing::warn!(run_id = %self.run_id, error = %e, "Run poll failed");
                FetchOutcome::Failed
            }
        };
        match view.cast(RunViewMsg::RunPolled(result)) {
            Ok(()) => outcome,
            Err(_) => FetchOutcome::Discarded,
        }
    }

    async fn poll_pages(&self, view: &ActorRef<RunViewMsg>) -> FetchOutcome {
        let cancel = self.cancel.clone();
        let result = self.backend.list_pages(&self.run_id, self.pages_limit).await;
        if cancel.is_cancelled() {
            tracing::debug!(run_id = %self.run_id, "Discarding pages poll after cancellation");
            return FetchOutcome::Discarded;
        }

        let outcome = match &result {
            Ok(_) => FetchOutcome::Delivered,
            Err(e) => {
                tracing::warn!(
                    run_id = %self.run_id,
                    limit = self.pages_limit,
                    error = %e,
                    "Pages poll failed"
                );
                FetchOutcome::Failed
            }
        };
        match view.cast(RunViewMsg::PagesPolled(result)) {
            Ok(()) => outcome,
            Err(_) => FetchOutcome::Discarded,
        }
    }
}
