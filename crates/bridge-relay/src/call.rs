use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bridge_db::RelayStore;
use bridge_types::platform::{PlatformError, PlatformResult};
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, Result};

/// Bounds every outbound platform call by the request timeout and by shutdown.
#[derive(Clone)]
pub struct CallGuard {
    timeout: Duration,
    shutdown: CancellationToken,
}

impl CallGuard {
    pub fn new(timeout: Duration, shutdown: CancellationToken) -> Self {
        Self { timeout, shutdown }
    }

    pub async fn run<T, F>(&self, call: F) -> PlatformResult<T>
    where
        F: Future<Output = PlatformResult<T>>,
    {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(PlatformError::Cancelled),
            res = tokio::time::timeout(self.timeout, call) => match res {
                Ok(out) => out,
                Err(_) => Err(PlatformError::Timeout),
            },
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Runs a store operation on the blocking pool.
pub async fn blocking<T, F>(store: &Arc<dyn RelayStore>, f: F) -> Result<T>
where
    F: FnOnce(&dyn RelayStore) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await?
        .map_err(RelayError::Storage)
}
