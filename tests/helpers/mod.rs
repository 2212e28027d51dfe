#![allow(dead_code)]
pub mod fake_app;
pub mod fake_sqs;
pub mod test_jobs;

pub use fake_app::*;
pub use fake_sqs::*;
pub use test_jobs::*;

use std::future::Future;
use std::time::Duration;

/// Upper bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `fut`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("timed out waiting for test condition")
}

/// Poll `condition` until it holds or [`TEST_TIMEOUT`] passes.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}
