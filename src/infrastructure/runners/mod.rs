pub mod http_proxy;

use crate::domain::errors::DispatchResult;
use crate::domain::ports::{Job, Runner};
use async_trait::async_trait;

pub use http_proxy::HttpProxyRunner;

/// Every runner this build knows about.
pub enum RunnerBackend {
    HttpProxy(HttpProxyRunner),
}

impl RunnerBackend {
    pub fn name(&self) -> &'static str {
        match self {
            RunnerBackend::HttpProxy(_) => "http_proxy",
        }
    }
}

#[async_trait]
impl Runner for RunnerBackend {
    async fn run<J: Job>(&self, job: J) -> DispatchResult<()> {
        match self {
            RunnerBackend::HttpProxy(runner) => runner.run(job).await,
        }
    }

    fn maximum_concurrency(&self) -> usize {
        match self {
            RunnerBackend::HttpProxy(runner) => runner.maximum_concurrency(),
        }
    }
}

impl From<HttpProxyRunner> for RunnerBackend {
    fn from(runner: HttpProxyRunner) -> Self {
        RunnerBackend::HttpProxy(runner)
    }
}
