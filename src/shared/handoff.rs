//! Rendezvous channel between a queue backend and the dispatcher.
//!
//! A job changes hands only while the receiving side is waiting in
//! [`JobReceiver::recv`], which gives the semantics of an unbuffered channel:
//! a backend can never run ahead of the dispatcher. Producers may bound how
//! long they wait, and get the job back when nobody takes it in time.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub fn channel<T>() -> (JobSender<T>, JobReceiver<T>) {
    let (demand_tx, demand_rx) = mpsc::channel(1);
    (
        JobSender {
            demands: demand_rx,
            closed: false,
        },
        JobReceiver { demands: demand_tx },
    )
}

/// Producer half, owned by a queue backend's dequeue loop.
pub struct JobSender<T> {
    demands: mpsc::Receiver<oneshot::Sender<T>>,
    closed: bool,
}

/// Consumer half, owned by the dispatcher.
pub struct JobReceiver<T> {
    demands: mpsc::Sender<oneshot::Sender<T>>,
}

impl<T> JobSender<T> {
    /// Hand `job` over as soon as the receiver asks for one.
    pub async fn send(&mut self, job: T) -> Result<(), T> {
        self.deliver(job, None, &CancellationToken::new()).await
    }

    /// Like [`send`](Self::send), but gives the job back if `cancel` fires first.
    pub async fn offer(&mut self, job: T, cancel: &CancellationToken) -> Result<(), T> {
        self.deliver(job, None, cancel).await
    }

    /// Like [`offer`](Self::offer), also giving up after `timeout`.
    pub async fn offer_within(
        &mut self,
        job: T,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), T> {
        self.deliver(job, Some(Instant::now() + timeout), cancel)
            .await
    }

    async fn deliver(
        &mut self,
        mut job: T,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(), T> {
        loop {
            let demand = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                demand = until(deadline, self.next_demand()) => demand,
            };

            let Some(demand) = demand else {
                return Err(job);
            };

            // The receiver may have stopped waiting since it asked.
            match demand.send(job) {
                Ok(()) => return Ok(()),
                Err(returned) => job = returned,
            }
        }
    }

    /// True once the receiver is gone; every later offer fails immediately.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn next_demand(&mut self) -> Option<oneshot::Sender<T>> {
        while let Some(demand) = self.demands.recv().await {
            if !demand.is_closed() {
                return Some(demand);
            }
        }
        self.closed = true;
        None
    }
}

impl<T> JobReceiver<T> {
    /// Wait for the next job. Returns `None` once the producer is gone.
    ///
    /// Dropping this future after the producer accepted the request drops
    /// the job with it, so callers must not race it against other branches.
    pub async fn recv(&self) -> Option<T> {
        let (demand, job) = oneshot::channel();
        self.demands.send(demand).await.ok()?;
        job.await.ok()
    }
}

async fn until<F, X>(deadline: Option<Instant>, fut: F) -> Option<X>
where
    F: Future<Output = Option<X>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok().flatten(),
        None => fut.await,
    }
}
