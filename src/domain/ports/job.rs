use crate::domain::entities::{Payload, RetryAfter};
use async_trait::async_trait;

/// One unit of work pulled from a queue backend.
///
/// `end` and `abort` consume the job, so a job resolves at most once.
/// A job that is dropped without being resolved is released by its backend
/// (rolled back session, message left to reappear after its visibility
/// timeout), which is also how speculative jobs that never received a
/// payload go away.
#[async_trait]
pub trait Job: Send + 'static {
    /// Fields handed to the runner. Empty until `wait_finalize` returned true.
    fn payload(&self) -> &Payload;

    /// Block until the backend knows whether this job carries work.
    ///
    /// Backends that dequeue synchronously return `true` immediately.
    async fn wait_finalize(&mut self) -> bool;

    /// Commit the job; the backend removes the unit of work.
    async fn end(self);

    /// Hand the job back for redelivery, ideally after `retry_after` seconds.
    async fn abort(self, retry_after: RetryAfter);
}
