use crate::domain::errors::DispatchResult;
use crate::domain::ports::job::Job;
use async_trait::async_trait;

#[async_trait]
pub trait Runner: Send + Sync + 'static {
    /// Execute one finalized job and resolve it before returning.
    async fn run<J: Job>(&self, job: J) -> DispatchResult<()>;

    /// Upper bound on concurrent `run` calls. Enforced by the caller.
    fn maximum_concurrency(&self) -> usize;
}
