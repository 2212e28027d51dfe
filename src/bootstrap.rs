use crate::application::services::Dispatcher;
use crate::config::{Config, ConfigError};
use crate::infrastructure::queues::QueueBackend;
use crate::infrastructure::registry::Registry;
use crate::infrastructure::runners::RunnerBackend;

pub type AppDispatcher = Dispatcher<QueueBackend, RunnerBackend>;

/// Build the configured queue and runner and wire them into a dispatcher.
pub fn build_dispatcher(registry: &Registry, config: &Config) -> Result<AppDispatcher, ConfigError> {
    let queue = registry.build_queue(&config.queue)?;
    tracing::info!("Queue backend '{}' configured", queue.name());

    let runner = registry.build_runner(&config.runner)?;
    tracing::info!("Runner '{}' configured", runner.name());

    Ok(Dispatcher::new(queue, runner))
}
