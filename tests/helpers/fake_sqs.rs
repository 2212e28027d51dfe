use async_trait::async_trait;
use reprow::infrastructure::queues::sqs::{ReceiveRequest, SqsClient, SqsClientError, SqsMessage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// In-memory SQS that records every call.
#[derive(Default)]
pub struct FakeSqs {
    available: Mutex<VecDeque<SqsMessage>>,
    requests: Mutex<Vec<ReceiveRequest>>,
    deleted: Mutex<Vec<String>>,
    visibility_changes: Mutex<Vec<(String, i32)>>,
    failing: AtomicBool,
    /// When set, each receive holds until a permit is added or the gate closes.
    gate: Option<Semaphore>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeSqs {
    pub fn with_messages(count: usize) -> Self {
        let fake = Self::default();
        {
            let mut available = fake.available.lock().unwrap();
            for n in 1..=count {
                available.push_back(message(n));
            }
        }
        fake
    }

    pub fn failing() -> Self {
        let fake = Self::default();
        fake.failing.store(true, Ordering::SeqCst);
        fake
    }

    /// Receives block until [`let_through`](Self::let_through) or
    /// [`open`](Self::open) lets them answer.
    pub fn gated(count: usize) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::with_messages(count)
        }
    }

    pub fn let_through(&self, receives: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(receives);
        }
    }

    /// Stop holding receives, now and later.
    pub fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }

    /// Receive calls currently waiting for an answer.
    pub fn active_receives(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak_receives(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ReceiveRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn visibility_changes(&self) -> Vec<(String, i32)> {
        self.visibility_changes.lock().unwrap().clone()
    }
}

pub fn message(n: usize) -> SqsMessage {
    SqsMessage {
        message_id: format!("msg-{n}"),
        receipt_handle: format!("receipt-{n}"),
        body: format!("{{\"n\":{n}}}"),
        md5_of_body: format!("md5-{n}"),
        md5_of_message_attributes: None,
        attributes: Default::default(),
    }
}

#[async_trait]
impl SqsClient for FakeSqs {
    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<SqsMessage>, SqsClientError> {
        self.requests.lock().unwrap().push(request);

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(SqsClientError("service unavailable".to_string()));
        }

        let batch: Vec<SqsMessage> = {
            let mut available = self.available.lock().unwrap();
            let take = (request.max_messages as usize).min(available.len());
            available.drain(..take).collect()
        };

        if batch.is_empty() {
            // Stand in for a short long-poll.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(batch)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), SqsClientError> {
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<(), SqsClientError> {
        self.visibility_changes
            .lock()
            .unwrap()
            .push((receipt_handle.to_string(), visibility_timeout));
        Ok(())
    }
}
