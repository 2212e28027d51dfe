pub mod fifo;
pub mod q4m;
pub mod sqs;

use crate::domain::entities::{Payload, RetryAfter};
use crate::domain::errors::{DispatchError, DispatchResult};
use crate::domain::ports::{Job, Queue};
use crate::shared::handoff::JobSender;
use async_trait::async_trait;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

pub use fifo::{FifoJob, FifoQueue};
pub use q4m::{Q4mJob, Q4mQueue};
pub use sqs::{SqsJob, SqsQueue};

/// Start/stop bookkeeping shared by every backend's background loop.
#[derive(Default)]
pub(crate) struct Lifecycle {
    running: Option<LoopHandle>,
}

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Lifecycle {
    pub(crate) fn start<F, Fut>(&mut self, span: &Span, body: F) -> DispatchResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.running.is_some() {
            return Err(DispatchError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(body(cancel.clone()).instrument(span.clone()));
        self.running = Some(LoopHandle { cancel, task });
        Ok(())
    }

    /// Cancel the loop and wait until it, and everything it launched, is done.
    pub(crate) async fn stop(&mut self) -> DispatchResult<()> {
        let handle = self.running.take().ok_or(DispatchError::NotRunning)?;
        handle.cancel.cancel();

        if let Err(e) = handle.task.await {
            tracing::error!("Queue loop terminated abnormally: {}", e);
        }
        Ok(())
    }
}

/// Every queue backend this build knows about.
pub enum QueueBackend {
    Fifo(FifoQueue),
    Q4m(Q4mQueue),
    Sqs(SqsQueue),
}

/// A job from any backend in [`QueueBackend`].
pub enum QueuedJob {
    Fifo(FifoJob),
    Q4m(Q4mJob),
    Sqs(SqsJob),
}

impl QueueBackend {
    pub fn name(&self) -> &'static str {
        match self {
            QueueBackend::Fifo(_) => "fifo",
            QueueBackend::Q4m(_) => "q4m",
            QueueBackend::Sqs(_) => "sqs",
        }
    }
}

#[async_trait]
impl Queue for QueueBackend {
    type Job = QueuedJob;

    fn start(&mut self, out: JobSender<QueuedJob>) -> DispatchResult<()> {
        match self {
            QueueBackend::Fifo(queue) => queue.start_into(out),
            QueueBackend::Q4m(queue) => queue.start_into(out),
            QueueBackend::Sqs(queue) => queue.start_into(out),
        }
    }

    async fn stop(&mut self) -> DispatchResult<()> {
        match self {
            QueueBackend::Fifo(queue) => queue.stop().await,
            QueueBackend::Q4m(queue) => queue.stop().await,
            QueueBackend::Sqs(queue) => queue.stop().await,
        }
    }

    fn honors_retry_after(&self) -> bool {
        match self {
            QueueBackend::Fifo(queue) => queue.honors_retry_after(),
            QueueBackend::Q4m(queue) => queue.honors_retry_after(),
            QueueBackend::Sqs(queue) => queue.honors_retry_after(),
        }
    }
}

#[async_trait]
impl Job for QueuedJob {
    fn payload(&self) -> &Payload {
        match self {
            QueuedJob::Fifo(job) => job.payload(),
            QueuedJob::Q4m(job) => job.payload(),
            QueuedJob::Sqs(job) => job.payload(),
        }
    }

    async fn wait_finalize(&mut self) -> bool {
        match self {
            QueuedJob::Fifo(job) => job.wait_finalize().await,
            QueuedJob::Q4m(job) => job.wait_finalize().await,
            QueuedJob::Sqs(job) => job.wait_finalize().await,
        }
    }

    async fn end(self) {
        match self {
            QueuedJob::Fifo(job) => job.end().await,
            QueuedJob::Q4m(job) => job.end().await,
            QueuedJob::Sqs(job) => job.end().await,
        }
    }

    async fn abort(self, retry_after: RetryAfter) {
        match self {
            QueuedJob::Fifo(job) => job.abort(retry_after).await,
            QueuedJob::Q4m(job) => job.abort(retry_after).await,
            QueuedJob::Sqs(job) => job.abort(retry_after).await,
        }
    }
}

impl From<FifoJob> for QueuedJob {
    fn from(job: FifoJob) -> Self {
        QueuedJob::Fifo(job)
    }
}

impl From<Q4mJob> for QueuedJob {
    fn from(job: Q4mJob) -> Self {
        QueuedJob::Q4m(job)
    }
}

impl From<SqsJob> for QueuedJob {
    fn from(job: SqsJob) -> Self {
        QueuedJob::Sqs(job)
    }
}

impl From<FifoQueue> for QueueBackend {
    fn from(queue: FifoQueue) -> Self {
        QueueBackend::Fifo(queue)
    }
}

impl From<Q4mQueue> for QueueBackend {
    fn from(queue: Q4mQueue) -> Self {
        QueueBackend::Q4m(queue)
    }
}

impl From<SqsQueue> for QueueBackend {
    fn from(queue: SqsQueue) -> Self {
        QueueBackend::Sqs(queue)
    }
}

/// Sleep for `period` unless `cancel` fires first. Returns true when cancelled.
pub(crate) async fn pause(period: std::time::Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(period) => false,
    }
}
