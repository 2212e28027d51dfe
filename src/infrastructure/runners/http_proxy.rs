use crate::config::{decode_block, ConfigError};
use crate::domain::entities::RetryAfter;
use crate::domain::errors::{DispatchError, DispatchResult};
use crate::domain::ports::{Job, Runner};
use crate::shared::duration;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::Span;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpProxyConfig {
    pub url: String,
    pub concurrency: usize,
    #[serde(deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
    /// Used when the endpoint is unreachable or sends no usable `Retry-After`.
    #[serde(default)]
    pub default_retry_after: RetryAfter,
    #[serde(default = "default_token")]
    pub token: String,
}

fn default_token() -> String {
    "Test".to_string()
}

/// Forwards each job to an HTTP endpoint as a JSON POST.
pub struct HttpProxyRunner {
    config: HttpProxyConfig,
    url: Url,
    client: reqwest::Client,
    span: Span,
}

impl HttpProxyRunner {
    pub fn new(config: HttpProxyConfig) -> Result<Self, ConfigError> {
        let url = Url::parse(&config.url).map_err(|e| ConfigError::invalid("http_proxy.url", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "http_proxy.url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if config.concurrency == 0 {
            return Err(ConfigError::invalid(
                "http_proxy.concurrency",
                "must be at least 1",
            ));
        }

        if config.timeout.is_zero() {
            return Err(ConfigError::invalid("http_proxy.timeout", "must be positive"));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::invalid("http_proxy", e))?;

        let span = tracing::info_span!("runner", backend = "http_proxy", url = %url);

        Ok(Self {
            config,
            url,
            client,
            span,
        })
    }

    pub fn from_block(block: serde_yaml::Value) -> Result<Self, ConfigError> {
        Self::new(decode_block("http_proxy", block)?)
    }

    /// Integer seconds from `Retry-After`, or the configured default.
    fn retry_after(&self, response: &reqwest::Response) -> RetryAfter {
        let Some(header) = response.headers().get(RETRY_AFTER) else {
            return self.config.default_retry_after;
        };

        match header.to_str().ok().and_then(|v| v.trim().parse().ok()) {
            Some(seconds) => seconds,
            None => {
                tracing::error!(
                    parent: &self.span,
                    "Malformed Retry-After header, only integer seconds are supported"
                );
                self.config.default_retry_after
            }
        }
    }
}

#[async_trait]
impl Runner for HttpProxyRunner {
    async fn run<J: Job>(&self, job: J) -> DispatchResult<()> {
        let request = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.config.token)
            .json(job.payload());
        let sent = request.send().await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(parent: &self.span, "Backend response not retrieved: {}", e);
                job.abort(self.config.default_retry_after).await;
                metrics::counter!("reprow_jobs_aborted_total").increment(1);
                return Err(DispatchError::BackendUnreachable(e.to_string()));
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            job.end().await;
            metrics::counter!("reprow_jobs_completed_total").increment(1);
            return Ok(());
        }

        let retry_after = self.retry_after(&response);
        tracing::error!(
            parent: &self.span,
            status = status.as_u16(),
            retry_after,
            "Backend returned invalid status code"
        );
        job.abort(retry_after).await;
        metrics::counter!("reprow_jobs_aborted_total").increment(1);

        Err(DispatchError::BackendRejected {
            status: status.as_u16(),
            retry_after,
        })
    }

    fn maximum_concurrency(&self) -> usize {
        self.config.concurrency
    }
}

pub fn register(registry: &mut crate::infrastructure::registry::Registry) -> Result<(), ConfigError> {
    registry.register_runner("http_proxy", |block| {
        Ok(HttpProxyRunner::from_block(block)?.into())
    })
}
