use async_trait::async_trait;
use aws_sdk_sqs::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use std::collections::BTreeMap;

/// A received message, reduced to the fields jobs carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqsMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub md5_of_body: String,
    pub md5_of_message_attributes: Option<String>,
    /// String-valued message attributes.
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: i32,
    pub visibility_timeout: i32,
    pub wait_time_seconds: i32,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SqsClientError(pub String);

/// The three SQS calls the queue needs.
#[async_trait]
pub trait SqsClient: Send + Sync {
    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<SqsMessage>, SqsClientError>;

    async fn delete(&self, receipt_handle: &str) -> Result<(), SqsClientError>;

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<(), SqsClientError>;
}

/// [`SqsClient`] backed by the AWS SDK, bound to one queue URL.
pub struct AwsSqsClient {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl AwsSqsClient {
    pub fn new(
        access_key_id: &str,
        secret_access_key: &str,
        region: &str,
        endpoint: Option<&str>,
        queue_url: &str,
    ) -> Self {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "reprow-config",
        );

        let mut builder = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials);

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: aws_sdk_sqs::Client::from_conf(builder.build()),
            queue_url: queue_url.to_string(),
        }
    }
}

#[async_trait]
impl SqsClient for AwsSqsClient {
    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<SqsMessage>, SqsClientError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(request.max_messages)
            .visibility_timeout(request.visibility_timeout)
            .wait_time_seconds(request.wait_time_seconds)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| SqsClientError(DisplayErrorContext(&e).to_string()))?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|message| SqsMessage {
                message_id: message.message_id.unwrap_or_default(),
                receipt_handle: message.receipt_handle.unwrap_or_default(),
                body: message.body.unwrap_or_default(),
                md5_of_body: message.md5_of_body.unwrap_or_default(),
                md5_of_message_attributes: message.md5_of_message_attributes,
                attributes: message
                    .message_attributes
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|(name, value)| value.string_value.map(|text| (name, text)))
                    .collect(),
            })
            .collect();

        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), SqsClientError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| SqsClientError(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<(), SqsClientError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(visibility_timeout)
            .send()
            .await
            .map_err(|e| SqsClientError(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
