//! Event types for hub activity streaming
//!
//! These events describe every observable transition of the hub:
//! - Presence (announce, lost, recovered)
//! - Session progress (task completed, reset)
//! - Outbound commands (what was broadcast and to whom)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::CommandKind;
use crate::domain::{DeviceId, TaskId};

/// Core event enum - the vocabulary of hub activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HubEvent {
    // === Presence ===
    /// A module introduced itself for the first time (or after a loss)
    DeviceAnnounced { device: DeviceId },
    /// A module crossed the missed-beat threshold
    DeviceLost { device: DeviceId },
    /// A lost or not-yet-connected module sent a fresh signal
    DeviceRecovered { device: DeviceId },

    // === Session ===
    /// A module reported its puzzle solved
    TaskCompleted { task: TaskId },
    /// The operator reset the session
    SessionReset { session: String },

    // === Outbound ===
    /// A command was queued for broadcast
    CommandIssued {
        kind: CommandKind,
        targets: Vec<DeviceId>,
        payload: serde_json::Value,
    },
}

impl HubEvent {
    /// Get the event type name as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            HubEvent::DeviceAnnounced { .. } => "DeviceAnnounced",
            HubEvent::DeviceLost { .. } => "DeviceLost",
            HubEvent::DeviceRecovered { .. } => "DeviceRecovered",
            HubEvent::TaskCompleted { .. } => "TaskCompleted",
            HubEvent::SessionReset { .. } => "SessionReset",
            HubEvent::CommandIssued { .. } => "CommandIssued",
        }
    }

    /// The device this event concerns, if any
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            HubEvent::DeviceAnnounced { device }
            | HubEvent::DeviceLost { device }
            | HubEvent::DeviceRecovered { device } => Some(*device),
            _ => None,
        }
    }
}

/// Event with a wall-clock timestamp, for log sinks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: HubEvent,
}

impl EventLogEntry {
    pub fn new(event: HubEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
