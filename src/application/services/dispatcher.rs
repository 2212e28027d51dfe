use crate::domain::errors::DispatchResult;
use crate::domain::ports::{Job, Queue, Runner};
use crate::shared::handoff::{self, JobReceiver};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Moves jobs from a queue onto a runner, never running more than the
/// runner's maximum concurrency at once.
pub struct Dispatcher<Q, R> {
    queue: Q,
    runner: Arc<R>,
}

impl<Q, R> Dispatcher<Q, R>
where
    Q: Queue,
    R: Runner,
{
    pub fn new(queue: Q, runner: R) -> Self {
        Self {
            queue,
            runner: Arc::new(runner),
        }
    }

    /// Dispatch until `shutdown` resolves, then stop the queue and wait for
    /// every job already handed out to be resolved.
    pub async fn run<S>(mut self, shutdown: S) -> DispatchResult<()>
    where
        S: Future<Output = ()> + Send,
    {
        let (sender, receiver) = handoff::channel();
        self.queue.start(sender)?;

        info!(
            concurrency = self.runner.maximum_concurrency(),
            honors_retry_after = self.queue.honors_retry_after(),
            "Dispatcher started"
        );

        let dispatch = tokio::spawn(
            dispatch_loop(receiver, self.runner.clone()).in_current_span(),
        );

        shutdown.await;
        info!("Shutdown requested, stopping queue");

        // Stopping drops the queue's sender, which ends the dispatch loop.
        self.queue.stop().await?;

        if let Err(e) = dispatch.await {
            error!("Dispatch loop terminated abnormally: {}", e);
        }

        info!("All in-flight jobs resolved");
        Ok(())
    }
}

async fn dispatch_loop<J, R>(jobs: JobReceiver<J>, runner: Arc<R>)
where
    J: Job,
    R: Runner,
{
    let slots = Arc::new(Semaphore::new(runner.maximum_concurrency().max(1)));
    let tracker = TaskTracker::new();

    loop {
        let Ok(slot) = slots.clone().acquire_owned().await else {
            break;
        };

        let Some(mut job) = jobs.recv().await else {
            break;
        };

        let runner = runner.clone();
        let span = tracing::info_span!("job", id = %Uuid::new_v4());
        tracker.spawn(
            async move {
                let _slot = slot;

                if !job.wait_finalize().await {
                    metrics::counter!("reprow_jobs_empty_total").increment(1);
                    return;
                }

                let result = {
                    let _running = RunningGauge::enter();
                    runner.run(job).await
                };

                if let Err(e) = result {
                    warn!("Job run failed: {}", e);
                    metrics::counter!("reprow_dispatch_errors_total", "kind" => e.kind())
                        .increment(1);
                }
            }
            .instrument(span),
        );
    }

    info!("Queue closed, waiting for {} running jobs", tracker.len());
    tracker.close();
    tracker.wait().await;
}

/// Holds `reprow_runs_in_flight` up for as long as it lives, unwinding included.
struct RunningGauge;

impl RunningGauge {
    fn enter() -> Self {
        metrics::gauge!("reprow_runs_in_flight").increment(1.0);
        Self
    }
}

impl Drop for RunningGauge {
    fn drop(&mut self) {
        metrics::gauge!("reprow_runs_in_flight").decrement(1.0);
    }
}
