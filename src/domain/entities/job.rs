use serde_json::{Map, Value};

/// Ordered field mapping handed to runners.
pub type Payload = Map<String, Value>;

/// Seconds before an aborted job should become redeliverable.
pub type RetryAfter = u32;

/// How a job was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    Aborted { retry_after: RetryAfter },
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Completed => write!(f, "completed"),
            Resolution::Aborted { retry_after } => write!(f, "aborted(retry_after={retry_after})"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a json object, got {0}")]
    NotAnObject(&'static str),
}

/// Decode one serialized job into a payload. Only JSON objects qualify.
pub fn parse_payload(raw: &[u8]) -> Result<Payload, PayloadError> {
    match serde_json::from_slice(raw)? {
        Value::Object(map) => Ok(map),
        Value::Null => Err(PayloadError::NotAnObject("null")),
        Value::Bool(_) => Err(PayloadError::NotAnObject("boolean")),
        Value::Number(_) => Err(PayloadError::NotAnObject("number")),
        Value::String(_) => Err(PayloadError::NotAnObject("string")),
        Value::Array(_) => Err(PayloadError::NotAnObject("array")),
    }
}
