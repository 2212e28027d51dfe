pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::services::Dispatcher;
pub use config::{Config, ConfigError};
pub use domain::entities::{parse_payload, Payload, PayloadError, Resolution, RetryAfter};
pub use domain::errors::{DispatchError, DispatchResult};
pub use domain::ports::{Job, Queue, Runner};
