//! CoordinatorHandle - Client interface for inbound events

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{CoordRequest, HubError, HubSnapshot};
use crate::domain::{DeviceId, TaskId};

/// Handle for feeding events into the Coordinator
///
/// This handle is cloneable and is shared by the transport, the liveness
/// ticker and anything else that produces inbound events. Every call only
/// enqueues; the coordinator applies requests strictly in arrival order.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordRequest>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>) -> Self {
        Self { tx }
    }

    async fn send(&self, req: CoordRequest) -> Result<(), HubError> {
        self.tx.send(req).await.map_err(|_| HubError::ChannelClosed)
    }

    /// A module introduced itself (first contact)
    pub async fn announce(&self, device: DeviceId) -> Result<(), HubError> {
        debug!(%device, "CoordinatorHandle::announce: called");
        self.send(CoordRequest::Announce { device }).await
    }

    /// Liveness signal stamped with the coordinator's own clock
    #[cfg(test)]
    pub(crate) async fn liveness_signal(&self, device: DeviceId) -> Result<(), HubError> {
        debug!(%device, "CoordinatorHandle::liveness_signal: called");
        self.send(CoordRequest::Signal { device, at: None }).await
    }

    /// Any message from a module proves it is alive
    ///
    /// `at` is when the message arrived. Signals older than one already seen
    /// are ignored and ones ahead of the coordinator clock are capped to it.
    pub async fn liveness_signal_at(&self, device: DeviceId, at: Instant) -> Result<(), HubError> {
        debug!(%device, "CoordinatorHandle::liveness_signal_at: called");
        self.send(CoordRequest::Signal { device, at: Some(at) }).await
    }

    pub async fn task_completed(&self, task: TaskId) -> Result<(), HubError> {
        debug!(%task, "CoordinatorHandle::task_completed: called");
        self.send(CoordRequest::TaskCompleted { task }).await
    }

    pub async fn timer_expired(&self) -> Result<(), HubError> {
        debug!("CoordinatorHandle::timer_expired: called");
        self.send(CoordRequest::TimerExpired).await
    }

    pub async fn manual_pause(&self) -> Result<(), HubError> {
        debug!("CoordinatorHandle::manual_pause: called");
        self.send(CoordRequest::ManualPause).await
    }

    pub async fn manual_resume(&self) -> Result<(), HubError> {
        debug!("CoordinatorHandle::manual_resume: called");
        self.send(CoordRequest::ManualResume).await
    }

    pub async fn reset(&self) -> Result<(), HubError> {
        debug!("CoordinatorHandle::reset: called");
        self.send(CoordRequest::Reset).await
    }

    /// Force a liveness evaluation now
    pub async fn tick(&self) -> Result<(), HubError> {
        self.send(CoordRequest::Tick).await
    }

    /// Get current devices, session and metrics
    ///
    /// The reply is produced after every request queued before it.
    pub async fn snapshot(&self) -> Result<HubSnapshot, HubError> {
        debug!("CoordinatorHandle::snapshot: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::GetSnapshot { reply_tx }).await?;
        reply_rx.await.map_err(|_| HubError::NoReply)
    }

    /// Request shutdown of the Coordinator
    pub async fn shutdown(&self) -> Result<(), HubError> {
        debug!("CoordinatorHandle::shutdown: called");
        self.send(CoordRequest::Shutdown).await
    }
}
