//! Outbox task
//!
//! Broadcasts leave the coordinator through a queue so pacing delays never
//! hold up presence evaluation. Order of broadcasts is preserved.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::command::Broadcast;
use super::dispatcher::Dispatcher;

/// Spawn the outbox task and return its queue
pub fn spawn_outbox(dispatcher: Arc<dyn Dispatcher>, buffer: usize) -> (mpsc::Sender<Broadcast>, JoinHandle<u64>) {
    let (tx, mut rx) = mpsc::channel::<Broadcast>(buffer.max(1));

    let handle = tokio::spawn(async move {
        info!("Outbox started");
        let mut delivered = 0u64;
        while let Some(broadcast) = rx.recv().await {
            debug!(
                kind = %broadcast.command.kind(),
                targets = broadcast.targets.len(),
                "Outbox: dispatching"
            );
            dispatcher.broadcast(&broadcast.command, &broadcast.targets).await;
            delivered += 1;
        }
        info!(delivered, "Outbox stopped");
        delivered
    });

    (tx, handle)
}
