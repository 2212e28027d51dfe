//! Queue backed by a named pipe or a plain file, one JSON object per line.
//!
//! Create a pipe with `mkfifo /tmp/queue`. Anything buffered in the pipe is
//! lost when the host goes down, so this backend is mainly for development.

use super::{pause, Lifecycle};
use crate::config::{decode_block, ConfigError};
use crate::domain::entities::{parse_payload, Payload, RetryAfter};
use crate::domain::errors::DispatchResult;
use crate::domain::ports::{Job, Queue};
use crate::shared::duration;
use crate::shared::handoff::JobSender;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::SeekFrom;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio_util::sync::CancellationToken;
use tracing::Span;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FifoConfig {
    pub path: PathBuf,
    /// How long to wait before polling a plain file again after reaching its end.
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "duration::deserialize"
    )]
    pub poll_interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(200)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Pipe,
    File,
}

struct FifoShared {
    path: PathBuf,
    kind: SourceKind,
    /// Bytes of a plain file already consumed, kept across restarts.
    offset: AtomicU64,
    span: Span,
}

pub struct FifoQueue {
    shared: Arc<FifoShared>,
    poll_interval: Duration,
    lifecycle: Lifecycle,
}

impl FifoQueue {
    pub fn new(config: FifoConfig) -> Result<Self, ConfigError> {
        let metadata = std::fs::metadata(&config.path).map_err(|e| {
            ConfigError::invalid(
                "fifo.path",
                format!("{} is not accessible: {}", config.path.display(), e),
            )
        })?;

        let kind = if metadata.file_type().is_fifo() {
            SourceKind::Pipe
        } else if metadata.is_file() {
            SourceKind::File
        } else {
            return Err(ConfigError::invalid(
                "fifo.path",
                format!(
                    "{} is neither a named pipe nor a regular file. use mkfifo to make one",
                    config.path.display()
                ),
            ));
        };

        let span = tracing::info_span!("queue", backend = "fifo", path = %config.path.display());

        Ok(Self {
            shared: Arc::new(FifoShared {
                path: config.path,
                kind,
                offset: AtomicU64::new(0),
                span,
            }),
            poll_interval: config.poll_interval,
            lifecycle: Lifecycle::default(),
        })
    }

    pub fn from_block(block: serde_yaml::Value) -> Result<Self, ConfigError> {
        Self::new(decode_block("fifo", block)?)
    }

    pub fn is_named_pipe(&self) -> bool {
        self.shared.kind == SourceKind::Pipe
    }

    /// Start following the file, publishing jobs wrapped into `J`.
    pub fn start_into<J>(&mut self, out: JobSender<J>) -> DispatchResult<()>
    where
        J: From<FifoJob> + Send + 'static,
    {
        let shared = self.shared.clone();
        let poll_interval = self.poll_interval;
        self.lifecycle.start(&self.shared.span, move |cancel| {
            follow(shared, poll_interval, out, cancel)
        })
    }
}

#[async_trait]
impl Queue for FifoQueue {
    type Job = FifoJob;

    fn start(&mut self, out: JobSender<FifoJob>) -> DispatchResult<()> {
        self.start_into(out)
    }

    async fn stop(&mut self) -> DispatchResult<()> {
        tracing::info!(parent: &self.shared.span, "Stopping queue");
        self.lifecycle.stop().await
    }
}

type LineReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

async fn follow<J>(
    shared: Arc<FifoShared>,
    poll_interval: Duration,
    mut out: JobSender<J>,
    cancel: CancellationToken,
) where
    J: From<FifoJob> + Send + 'static,
{
    let mut reader = loop {
        match shared.open_reader().await {
            Ok(reader) => break reader,
            Err(e) => {
                tracing::error!("Failed to open {}: {}", shared.path.display(), e);
                if pause(poll_interval, &cancel).await {
                    return;
                }
            }
        }
    };

    tracing::info!("Following queue file");
    let mut buf = Vec::new();

    loop {
        // Partially read bytes stay in `buf`, so the read can be restarted.
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                if pause(poll_interval, &cancel).await {
                    break;
                }
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Failed to read queue file: {}", e);
                if pause(poll_interval, &cancel).await {
                    break;
                }
                continue;
            }
        }

        // Hold partial lines until their newline arrives.
        if buf.last() != Some(&b'\n') {
            continue;
        }

        let line = std::mem::take(&mut buf);
        let consumed = line.len() as u64;
        let text = trim_line(&line);

        if text.is_empty() {
            shared.advance(consumed);
            continue;
        }

        let payload = match parse_payload(text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    "Failed to deserialize queue line, skipping. line={} err={}",
                    String::from_utf8_lossy(text),
                    e
                );
                shared.advance(consumed);
                continue;
            }
        };

        let job = FifoJob {
            payload,
            shared: shared.clone(),
        };

        match out.offer(J::from(job), &cancel).await {
            Ok(()) => shared.advance(consumed),
            Err(_) => {
                // Nobody took the line. A plain file keeps its offset; a pipe
                // has already lost it, so write it back.
                if shared.kind == SourceKind::Pipe {
                    if let Err(e) = shared.append(text).await {
                        tracing::error!("Failed to requeue undelivered line: {}", e);
                    }
                }
                break;
            }
        }
    }

    tracing::info!("Stopped following queue file");
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

impl FifoShared {
    async fn open_reader(&self) -> std::io::Result<LineReader> {
        let source: Box<dyn AsyncRead + Send + Unpin> = match self.kind {
            // Opening read-write keeps a writer attached, so the reader
            // never sees EOF when producers come and go.
            SourceKind::Pipe => Box::new(
                pipe::OpenOptions::new()
                    .read_write(true)
                    .open_receiver(&self.path)?,
            ),
            SourceKind::File => {
                let mut file = tokio::fs::File::open(&self.path).await?;
                let len = file.metadata().await?.len();
                let mut offset = self.offset.load(Ordering::Acquire);
                if offset > len {
                    tracing::warn!(offset, len, "Queue file shrank, reading from the start");
                    offset = 0;
                    self.offset.store(0, Ordering::Release);
                }
                file.seek(SeekFrom::Start(offset)).await?;
                Box::new(file)
            }
        };

        Ok(BufReader::new(source))
    }

    fn advance(&self, consumed: u64) {
        if self.kind == SourceKind::File {
            self.offset.fetch_add(consumed, Ordering::AcqRel);
        }
    }

    /// Append one record plus newline to the queue file.
    async fn append(&self, record: &[u8]) -> std::io::Result<()> {
        let mut line = Vec::with_capacity(record.len() + 1);
        line.extend_from_slice(record);
        line.push(b'\n');

        match self.kind {
            SourceKind::Pipe => {
                let mut sender = pipe::OpenOptions::new()
                    .read_write(true)
                    .open_sender(&self.path)?;
                sender.write_all(&line).await?;
            }
            SourceKind::File => {
                let mut file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(&self.path)
                    .await?;
                file.write_all(&line).await?;
                file.flush().await?;
            }
        }
        Ok(())
    }
}

/// One decoded line. Always final on arrival.
pub struct FifoJob {
    payload: Payload,
    shared: Arc<FifoShared>,
}

#[async_trait]
impl Job for FifoJob {
    fn payload(&self) -> &Payload {
        &self.payload
    }

    async fn wait_finalize(&mut self) -> bool {
        true
    }

    async fn end(self) {
        tracing::debug!(
            parent: &self.shared.span,
            "end job payload={}",
            serde_json::Value::Object(self.payload.clone())
        );
    }

    async fn abort(self, retry_after: RetryAfter) {
        let span = &self.shared.span;
        if retry_after > 0 {
            tracing::warn!(
                parent: span,
                retry_after,
                "Retry after is not supported by the fifo backend, requeueing immediately"
            );
        }

        let record = match serde_json::to_vec(&self.payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(parent: span, "Failed to serialize job: {}", e);
                return;
            }
        };

        if let Err(e) = self.shared.append(&record).await {
            tracing::error!(parent: span, "Failed to requeue job: {}", e);
        }
    }
}

pub fn register(registry: &mut crate::infrastructure::registry::Registry) -> Result<(), ConfigError> {
    registry.register_queue("fifo", |block| Ok(FifoQueue::from_block(block)?.into()))
}
