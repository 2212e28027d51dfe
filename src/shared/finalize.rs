//! Single-use handshake for speculatively published jobs.
//!
//! A backend publishes a job before it knows whether a unit of work exists.
//! The [`Finalizer`] stays with the backend, which either delivers the
//! acquired work with [`Finalizer::succeed`] or reports that nothing was
//! dequeued. The job holds the matching [`Finalization`].

use tokio::sync::oneshot;

pub struct Finalizer<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Finalizer<T> {
    /// Deliver the acquired work. Gives it back if the job was already dropped,
    /// in which case the caller still owns the resources inside.
    pub fn succeed(self, value: T) -> Result<(), T> {
        self.tx.send(value)
    }

    /// Report that the dequeue attempt produced nothing.
    pub fn fail(self) {}
}

#[derive(Debug)]
pub enum Finalization<T> {
    Pending(oneshot::Receiver<T>),
    Succeeded,
    Failed,
}

impl<T> Finalization<T> {
    pub fn pending() -> (Finalizer<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Finalizer { tx }, Finalization::Pending(rx))
    }

    /// Wait for the backend's verdict.
    ///
    /// Yields the delivered value on the first successful call only; later
    /// calls return `None` and leave the outcome in [`succeeded`](Self::succeeded).
    pub async fn settle(&mut self) -> Option<T> {
        let Finalization::Pending(rx) = self else {
            return None;
        };

        match rx.await {
            Ok(value) => {
                *self = Finalization::Succeeded;
                Some(value)
            }
            Err(_) => {
                *self = Finalization::Failed;
                None
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Finalization::Succeeded)
    }
}
