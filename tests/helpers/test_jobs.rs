use async_trait::async_trait;
use reprow::shared::handoff::JobSender;
use reprow::{DispatchError, DispatchResult, Job, Payload, Queue, Resolution, RetryAfter, Runner};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Every resolution recorded by the jobs sharing it.
#[derive(Clone, Default)]
pub struct Outcomes(Arc<Mutex<Vec<(u64, Resolution)>>>);

impl Outcomes {
    pub fn all(&self) -> Vec<(u64, Resolution)> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn record(&self, id: u64, resolution: Resolution) {
        self.0.lock().unwrap().push((id, resolution));
    }
}

/// In-memory job that records how it was resolved.
pub struct RecordingJob {
    id: u64,
    payload: Payload,
    finalizes: bool,
    outcomes: Outcomes,
}

impl RecordingJob {
    pub fn new(id: u64, outcomes: &Outcomes) -> Self {
        let payload = match json!({ "id": id }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };

        Self {
            id,
            payload,
            finalizes: true,
            outcomes: outcomes.clone(),
        }
    }

    /// A speculative job whose dequeue came back empty.
    pub fn empty(id: u64, outcomes: &Outcomes) -> Self {
        Self {
            finalizes: false,
            ..Self::new(id, outcomes)
        }
    }
}

#[async_trait]
impl Job for RecordingJob {
    fn payload(&self) -> &Payload {
        &self.payload
    }

    async fn wait_finalize(&mut self) -> bool {
        self.finalizes
    }

    async fn end(self) {
        self.outcomes.record(self.id, Resolution::Completed);
    }

    async fn abort(self, retry_after: RetryAfter) {
        self.outcomes.record(self.id, Resolution::Aborted { retry_after });
    }
}

/// Queue that hands out a fixed list of jobs, then idles until stopped.
pub struct ScriptedQueue {
    jobs: Vec<RecordingJob>,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ScriptedQueue {
    pub fn new(jobs: Vec<RecordingJob>) -> Self {
        Self {
            jobs,
            running: None,
        }
    }
}

#[async_trait]
impl Queue for ScriptedQueue {
    type Job = RecordingJob;

    fn start(&mut self, mut out: JobSender<RecordingJob>) -> DispatchResult<()> {
        if self.running.is_some() {
            return Err(DispatchError::AlreadyRunning);
        }

        let jobs = std::mem::take(&mut self.jobs);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            for job in jobs {
                if out.offer(job, &token).await.is_err() {
                    return;
                }
            }
            token.cancelled().await;
        });

        self.running = Some((cancel, task));
        Ok(())
    }

    async fn stop(&mut self) -> DispatchResult<()> {
        let (cancel, task) = self.running.take().ok_or(DispatchError::NotRunning)?;
        cancel.cancel();
        let _ = task.await;
        Ok(())
    }
}

/// Runner that sleeps, then resolves, while tracking its own concurrency.
pub struct CountingRunner {
    concurrency: usize,
    delay: Duration,
    reject_odd: bool,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
}

#[derive(Clone)]
pub struct RunnerStats {
    peak: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
}

impl RunnerStats {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl CountingRunner {
    pub fn new(concurrency: usize, delay: Duration) -> Self {
        Self {
            concurrency,
            delay,
            reject_odd: false,
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Abort jobs with an odd `id` and report them as rejected.
    pub fn rejecting_odd(mut self) -> Self {
        self.reject_odd = true;
        self
    }

    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            peak: self.peak.clone(),
            runs: self.runs.clone(),
        }
    }
}

#[async_trait]
impl Runner for CountingRunner {
    async fn run<J: Job>(&self, job: J) -> DispatchResult<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        let odd = job.payload()["id"].as_u64().unwrap_or(0) % 2 == 1;
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.reject_odd && odd {
            job.abort(3).await;
            return Err(DispatchError::BackendRejected {
                status: 500,
                retry_after: 3,
            });
        }

        job.end().await;
        Ok(())
    }

    fn maximum_concurrency(&self) -> usize {
        self.concurrency
    }
}
