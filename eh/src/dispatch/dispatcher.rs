//! Dispatcher contract and implementations

use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::command::{Broadcast, Command};
use crate::domain::DeviceId;

/// Delivers one command to a set of devices
///
/// Fire-and-forget: implementations swallow delivery failures.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn broadcast(&self, command: &Command, targets: &[DeviceId]);
}

/// The raw publish primitive a transport provides
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, device: DeviceId, payload: &Value) -> Result<()>;
}

/// Publishes to each target in turn with a short pause in between
///
/// The pause only spares constrained receivers; a zero delay is valid.
pub struct PacedDispatcher<P> {
    publisher: P,
    pacing: Duration,
}

impl<P: Publisher> PacedDispatcher<P> {
    pub fn new(publisher: P, pacing: Duration) -> Self {
        debug!(pacing_ms = pacing.as_millis() as u64, "PacedDispatcher::new: called");
        Self { publisher, pacing }
    }
}

#[async_trait]
impl<P: Publisher> Dispatcher for PacedDispatcher<P> {
    async fn broadcast(&self, command: &Command, targets: &[DeviceId]) {
        let payload = command.payload();
        for (i, device) in targets.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            if let Err(e) = self.publisher.publish(*device, &payload).await {
                debug!(%device, kind = %command.kind(), error = %e, "PacedDispatcher: delivery failed");
            }
        }
    }
}

/// Forwards every broadcast into a channel
///
/// Used for in-process observers and tests.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<Broadcast>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Broadcast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn broadcast(&self, command: &Command, targets: &[DeviceId]) {
        let _ = self.tx.send(Broadcast {
            command: command.clone(),
            targets: targets.to_vec(),
        });
    }
}
