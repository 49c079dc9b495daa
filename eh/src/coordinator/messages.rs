//! Message types for the Coordinator

use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{DeviceId, TaskId};
use crate::presence::DeviceStatus;
use crate::session::SessionStatus;

/// Errors from talking to the coordinator
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Coordinator channel closed")]
    ChannelClosed,

    #[error("Coordinator shut down before replying")]
    NoReply,
}

/// Requests processed, in order, by the Coordinator task
#[derive(Debug)]
pub enum CoordRequest {
    /// A module introduced itself
    Announce { device: DeviceId },

    /// Any message proving a module is reachable; `at` defaults to the
    /// coordinator clock's current time
    Signal { device: DeviceId, at: Option<Instant> },

    /// A module reported its puzzle solved
    TaskCompleted { task: TaskId },

    /// The countdown ran out
    TimerExpired,

    /// Operator pause
    ManualPause,

    /// Operator resume
    ManualResume,

    /// Operator reset
    Reset,

    /// Liveness evaluation pass
    Tick,

    /// Get a point-in-time view of devices and session
    GetSnapshot { reply_tx: oneshot::Sender<HubSnapshot> },

    /// Shutdown the coordinator
    Shutdown,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorMetrics {
    pub messages_received: u64,
    pub signals: u64,
    pub dropped_signals: u64,
    pub ticks: u64,
    pub devices_lost: u64,
    pub devices_recovered: u64,
    pub commands_issued: u64,
}

/// Point-in-time view returned by [`CoordRequest::GetSnapshot`]
#[derive(Debug, Clone, Serialize)]
pub struct HubSnapshot {
    pub session: SessionStatus,
    pub devices: Vec<DeviceStatus>,
    pub metrics: CoordinatorMetrics,
}

impl HubSnapshot {
    pub fn device(&self, id: DeviceId) -> Option<&DeviceStatus> {
        self.devices.iter().find(|d| d.id == id)
    }
}
