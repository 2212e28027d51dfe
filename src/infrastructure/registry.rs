use crate::config::{ComponentConfig, ConfigError};
use crate::infrastructure::queues::{self, QueueBackend};
use crate::infrastructure::runners::{self, RunnerBackend};
use std::collections::HashMap;

pub type QueueFactory = fn(serde_yaml::Value) -> Result<QueueBackend, ConfigError>;
pub type RunnerFactory = fn(serde_yaml::Value) -> Result<RunnerBackend, ConfigError>;

/// Name to constructor mapping for queue backends and runners.
///
/// Backends register themselves explicitly; a name taken twice is a
/// configuration error.
#[derive(Default)]
pub struct Registry {
    queues: HashMap<String, QueueFactory>,
    runners: HashMap<String, RunnerFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every backend compiled into this build.
    pub fn with_builtin() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        queues::fifo::register(&mut registry)?;
        queues::q4m::register(&mut registry)?;
        queues::sqs::register(&mut registry)?;
        runners::http_proxy::register(&mut registry)?;
        Ok(registry)
    }

    pub fn register_queue(
        &mut self,
        name: &str,
        factory: QueueFactory,
    ) -> Result<(), ConfigError> {
        if self.queues.contains_key(name) {
            return Err(ConfigError::DuplicateRegistration {
                kind: "queue",
                name: name.to_string(),
            });
        }
        self.queues.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn register_runner(
        &mut self,
        name: &str,
        factory: RunnerFactory,
    ) -> Result<(), ConfigError> {
        if self.runners.contains_key(name) {
            return Err(ConfigError::DuplicateRegistration {
                kind: "runner",
                name: name.to_string(),
            });
        }
        self.runners.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn build_queue(&self, component: &ComponentConfig) -> Result<QueueBackend, ConfigError> {
        let factory = self
            .queues
            .get(&component.name)
            .ok_or_else(|| ConfigError::UnknownQueue(component.name.clone()))?;
        factory(component.config.clone())
    }

    pub fn build_runner(&self, component: &ComponentConfig) -> Result<RunnerBackend, ConfigError> {
        let factory = self
            .runners
            .get(&component.name)
            .ok_or_else(|| ConfigError::UnknownRunner(component.name.clone()))?;
        factory(component.config.clone())
    }

    pub fn queue_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queues.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn runner_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.runners.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
