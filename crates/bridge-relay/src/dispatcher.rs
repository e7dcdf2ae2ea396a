use std::sync::Arc;

use bridge_types::events::InboundEvent;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::processor::RelayProcessor;

/// Pulls events off the gateway channel and handles each on its own task,
/// at most `max_concurrent` at a time. Drains in-flight tasks before returning.
pub async fn run(
    processor: Arc<RelayProcessor>,
    mut events: mpsc::Receiver<InboundEvent>,
    max_concurrent: usize,
    shutdown: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = res {
                    error!(error = %e, "Event task panicked");
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };

                // Identity must be in place before the next message is judged.
                if matches!(event, InboundEvent::Ready { .. }) {
                    processor.handle(event).await;
                    continue;
                }

                let permit = match permits.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let processor = processor.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    processor.handle(event).await;
                });
            }
        }
    }

    info!("Dispatcher stopping, draining {} in-flight events", tasks.len());
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "Event task panicked");
        }
    }
}
