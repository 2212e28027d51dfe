//! Queue backed by Amazon SQS (or any endpoint speaking its API).
//!
//! Jobs are published speculatively and collected into a batch; one long-poll
//! receive then asks for exactly as many messages as the batch holds and
//! hands them out in order.

mod client;

pub use client::{AwsSqsClient, ReceiveRequest, SqsClient, SqsClientError, SqsMessage};

use super::Lifecycle;
use crate::config::{decode_block, ConfigError};
use crate::domain::entities::{Payload, RetryAfter};
use crate::domain::errors::DispatchResult;
use crate::domain::ports::{Job, Queue};
use crate::shared::duration;
use crate::shared::finalize::{Finalization, Finalizer};
use crate::shared::handoff::JobSender;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span};

/// Largest batch a single receive call may ask for.
pub const MAX_NUMBER_OF_MESSAGES: usize = 10;
const MAX_WAIT_TIME_SECONDS: i32 = 20;
const MAX_VISIBILITY_TIMEOUT: i32 = 43_200;
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub url: String,
    pub visibility_timeout: i32,
    /// Receive calls allowed in flight at once.
    pub max_concurrency: usize,
    /// How long to wait for the dispatcher before sending a partial batch.
    #[serde(deserialize_with = "duration::deserialize")]
    pub buffer_timeout: Duration,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_wait_time_seconds")]
    pub wait_time_seconds: i32,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_wait_time_seconds() -> i32 {
    10
}

fn default_max_batch() -> usize {
    MAX_NUMBER_OF_MESSAGES
}

impl SqsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("sqs.access_key_id", &self.access_key_id),
            ("sqs.secret_access_key", &self.secret_access_key),
            ("sqs.region", &self.region),
            ("sqs.url", &self.url),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }

        if !(0..=MAX_VISIBILITY_TIMEOUT).contains(&self.visibility_timeout) {
            return Err(ConfigError::invalid(
                "sqs.visibility_timeout",
                format!("must be between 0 and {}", MAX_VISIBILITY_TIMEOUT),
            ));
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid(
                "sqs.max_concurrency",
                "must be at least 1",
            ));
        }

        if self.buffer_timeout.is_zero() {
            return Err(ConfigError::invalid("sqs.buffer_timeout", "must be positive"));
        }

        if !(0..=MAX_WAIT_TIME_SECONDS).contains(&self.wait_time_seconds) {
            return Err(ConfigError::invalid(
                "sqs.wait_time_seconds",
                format!("must be between 0 and {}", MAX_WAIT_TIME_SECONDS),
            ));
        }

        if !(1..=MAX_NUMBER_OF_MESSAGES).contains(&self.max_batch) {
            return Err(ConfigError::invalid(
                "sqs.max_batch",
                format!("must be between 1 and {}", MAX_NUMBER_OF_MESSAGES),
            ));
        }

        Ok(())
    }
}

struct SqsShared {
    config: SqsConfig,
    client: Arc<dyn SqsClient>,
    span: Span,
}

pub struct SqsQueue {
    shared: Arc<SqsShared>,
    lifecycle: Lifecycle,
}

impl SqsQueue {
    pub fn new(config: SqsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = AwsSqsClient::new(
            &config.access_key_id,
            &config.secret_access_key,
            &config.region,
            config.endpoint.as_deref(),
            &config.url,
        );
        Self::with_client(config, Arc::new(client))
    }

    /// Build the queue on top of any [`SqsClient`].
    pub fn with_client(config: SqsConfig, client: Arc<dyn SqsClient>) -> Result<Self, ConfigError> {
        config.validate()?;
        let span = tracing::info_span!("queue", backend = "sqs", url = %config.url);

        Ok(Self {
            shared: Arc::new(SqsShared {
                config,
                client,
                span,
            }),
            lifecycle: Lifecycle::default(),
        })
    }

    pub fn from_block(block: serde_yaml::Value) -> Result<Self, ConfigError> {
        Self::new(decode_block("sqs", block)?)
    }

    pub fn start_into<J>(&mut self, out: JobSender<J>) -> DispatchResult<()>
    where
        J: From<SqsJob> + Send + 'static,
    {
        let shared = self.shared.clone();
        self.lifecycle
            .start(&self.shared.span, move |cancel| receive_loop(shared, out, cancel))
    }
}

#[async_trait]
impl Queue for SqsQueue {
    type Job = SqsJob;

    fn start(&mut self, out: JobSender<SqsJob>) -> DispatchResult<()> {
        self.start_into(out)
    }

    async fn stop(&mut self) -> DispatchResult<()> {
        tracing::info!(
            parent: &self.shared.span,
            "Waiting for open long polling requests, this takes up to {}s",
            self.shared.config.wait_time_seconds
        );
        self.lifecycle.stop().await
    }

    fn honors_retry_after(&self) -> bool {
        true
    }
}

async fn receive_loop<J>(shared: Arc<SqsShared>, mut out: JobSender<J>, cancel: CancellationToken)
where
    J: From<SqsJob> + Send + 'static,
{
    let admission = Arc::new(Semaphore::new(shared.config.max_concurrency));
    let tracker = TaskTracker::new();

    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = admission.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        // Batches are built on this task only, so receives stay as full as
        // the dispatcher's demand allows.
        let mut batch = Vec::with_capacity(shared.config.max_batch);
        while batch.len() < shared.config.max_batch {
            let (finalizer, job) = SqsJob::speculative(shared.clone());
            match out
                .offer_within(J::from(job), shared.config.buffer_timeout, &cancel)
                .await
            {
                Ok(()) => batch.push(finalizer),
                Err(_) => {
                    tracing::debug!("Buffering timeout reached, proceeding to receive");
                    break;
                }
            }
        }

        if cancel.is_cancelled() || out.is_closed() {
            // Dropping the finalizers fails the batch.
            break;
        }

        if batch.is_empty() {
            drop(permit);
            continue;
        }

        let shared = shared.clone();
        tracker.spawn(
            async move {
                shared.fill_batch(batch).await;
                drop(permit);
            }
            .in_current_span(),
        );
    }

    tracker.close();
    tracker.wait().await;
}

impl SqsShared {
    async fn fill_batch(&self, batch: Vec<Finalizer<SqsMessage>>) {
        let request = ReceiveRequest {
            max_messages: batch.len() as i32,
            visibility_timeout: self.config.visibility_timeout,
            wait_time_seconds: self.config.wait_time_seconds,
        };

        let messages = match self.client.receive(request).await {
            Ok(messages) => messages,
            Err(e) => {
                drop(batch);
                tracing::error!("Failed to receive messages: {}", e);
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                return;
            }
        };

        if messages.is_empty() {
            tracing::info!("No message retrieved");
        }

        let mut messages = messages.into_iter();
        for finalizer in batch {
            match messages.next() {
                Some(message) => {
                    tracing::info!(message_id = %message.message_id, "Created job");
                    if let Err(message) = finalizer.succeed(message) {
                        tracing::warn!(
                            message_id = %message.message_id,
                            "Job dropped before its message arrived, releasing message"
                        );
                        self.change_visibility(&message, 0).await;
                    }
                }
                None => finalizer.fail(),
            }
        }

        for extra in messages {
            tracing::warn!(message_id = %extra.message_id, "Received more messages than requested, releasing");
            self.change_visibility(&extra, 0).await;
        }
    }

    async fn change_visibility(&self, message: &SqsMessage, seconds: i32) {
        if let Err(e) = self
            .client
            .change_visibility(&message.receipt_handle, seconds)
            .await
        {
            tracing::error!(
                message_id = %message.message_id,
                "Failed to change message visibility: {}",
                e
            );
        }
    }
}

/// Payload fields exposed to runners for one message.
pub fn message_payload(message: &SqsMessage) -> Payload {
    let attributes: Payload = message
        .attributes
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();

    let mut payload = Payload::new();
    payload.insert("Body".into(), Value::String(message.body.clone()));
    payload.insert("MessageId".into(), Value::String(message.message_id.clone()));
    payload.insert("MD5OfBody".into(), Value::String(message.md5_of_body.clone()));
    payload.insert(
        "ReceiptHandle".into(),
        Value::String(message.receipt_handle.clone()),
    );
    payload.insert("MessageAttribute".into(), Value::Object(attributes));
    payload.insert(
        "MD5OfMessageAttributes".into(),
        message
            .md5_of_message_attributes
            .clone()
            .map_or(Value::Null, Value::String),
    );
    payload
}

/// A slot in a receive batch that may turn into a message.
pub struct SqsJob {
    payload: Payload,
    finalization: Finalization<SqsMessage>,
    message: Option<SqsMessage>,
    shared: Arc<SqsShared>,
}

impl SqsJob {
    fn speculative(shared: Arc<SqsShared>) -> (Finalizer<SqsMessage>, Self) {
        let (finalizer, finalization) = Finalization::pending();
        let job = Self {
            payload: Payload::new(),
            finalization,
            message: None,
            shared,
        };
        (finalizer, job)
    }
}

#[async_trait]
impl Job for SqsJob {
    fn payload(&self) -> &Payload {
        &self.payload
    }

    async fn wait_finalize(&mut self) -> bool {
        if let Some(message) = self.finalization.settle().await {
            self.payload = message_payload(&message);
            self.message = Some(message);
        }
        self.finalization.succeeded()
    }

    async fn end(self) {
        let span = self.shared.span.clone();
        let Some(message) = self.message else {
            tracing::warn!(parent: &span, "End requested for a job without a message");
            return;
        };

        match self.shared.client.delete(&message.receipt_handle).await {
            Ok(()) => tracing::debug!(parent: &span, message_id = %message.message_id, "Ended job"),
            Err(e) => tracing::error!(
                parent: &span,
                message_id = %message.message_id,
                "Failed to delete message: {}",
                e
            ),
        }
    }

    async fn abort(self, retry_after: RetryAfter) {
        let Some(message) = self.message.as_ref() else {
            tracing::warn!(parent: &self.shared.span, "Abort requested for a job without a message");
            return;
        };

        let seconds = i32::try_from(retry_after)
            .unwrap_or(MAX_VISIBILITY_TIMEOUT)
            .min(MAX_VISIBILITY_TIMEOUT);
        tracing::debug!(
            parent: &self.shared.span,
            message_id = %message.message_id,
            retry_after = seconds,
            "Aborting job"
        );

        self.shared
            .change_visibility(message, seconds)
            .instrument(self.shared.span.clone())
            .await;
    }
}

pub fn register(registry: &mut crate::infrastructure::registry::Registry) -> Result<(), ConfigError> {
    registry.register_queue("sqs", |block| Ok(SqsQueue::from_block(block)?.into()))
}
