use crate::domain::errors::DispatchResult;
use crate::domain::ports::job::Job;
use crate::shared::handoff::JobSender;
use async_trait::async_trait;

#[async_trait]
pub trait Queue: Send {
    type Job: Job;

    /// Start producing jobs onto `out` in the background.
    fn start(&mut self, out: JobSender<Self::Job>) -> DispatchResult<()>;

    /// Stop producing and wait until every in-flight dequeue has settled.
    async fn stop(&mut self) -> DispatchResult<()>;

    /// Whether `Job::abort` delays redelivery by the requested seconds.
    fn honors_retry_after(&self) -> bool {
        false
    }
}
