//! Inbound line classification
//!
//! Every line is one JSON object. Module lines carry a `type` and usually a
//! `device`; operator lines carry `"type": "OPERATOR"` and an `action`.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::{DeviceId, ParseIdError, TaskId};

/// Maximum accepted line length in bytes
pub const MAX_LINE_SIZE: usize = 4 * 1024;

/// A line that could not be turned into an [`Inbound`] message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line too long: {0} bytes")]
    TooLong(usize),

    #[error("Message has no type")]
    MissingType,

    #[error(transparent)]
    UnknownDevice(#[from] ParseIdError),

    #[error("Message names no device and the connection has not identified itself")]
    Unidentified,

    #[error("Unknown operator action: {0}")]
    UnknownAction(String),
}

/// Operator controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    Pause,
    Resume,
    Reset,
}

/// A classified inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// First contact (`CONNECTED` or `ANNOUNCE`)
    Announce(DeviceId),
    /// Plain `HEARTBEAT`
    Heartbeat(DeviceId),
    /// A module reported its puzzle solved
    TaskCompleted { device: DeviceId, task: TaskId },
    /// The countdown module ran out of time
    TimerFinished(DeviceId),
    /// Any other module message; still proves liveness
    Other { device: DeviceId, kind: String },
    /// Operator control line
    Operator(OperatorAction),
}

impl Inbound {
    /// The module this message came from, if any
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            Self::Announce(device) | Self::Heartbeat(device) | Self::TimerFinished(device) => Some(*device),
            Self::TaskCompleted { device, .. } | Self::Other { device, .. } => Some(*device),
            Self::Operator(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    device: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

/// Classify one line
///
/// `identified` is the device this connection already introduced itself
/// as; it is used when the line omits `device`.
pub fn classify(line: &str, identified: Option<DeviceId>) -> Result<Inbound, ProtocolError> {
    if line.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::TooLong(line.len()));
    }

    let raw: RawMessage = serde_json::from_str(line.trim())?;
    let kind = raw
        .kind
        .map(|k| k.trim().to_uppercase())
        .filter(|k| !k.is_empty())
        .ok_or(ProtocolError::MissingType)?;

    if kind == "OPERATOR" {
        let action = raw.action.unwrap_or_default();
        let action = match action.trim().to_lowercase().as_str() {
            "pause" => OperatorAction::Pause,
            "resume" => OperatorAction::Resume,
            "reset" => OperatorAction::Reset,
            _ => return Err(ProtocolError::UnknownAction(action)),
        };
        return Ok(Inbound::Operator(action));
    }

    let device = match raw.device {
        Some(name) => name.parse::<DeviceId>()?,
        None => identified.ok_or(ProtocolError::Unidentified)?,
    };

    let inbound = match kind.as_str() {
        "CONNECTED" | "ANNOUNCE" => Inbound::Announce(device),
        "HEARTBEAT" => Inbound::Heartbeat(device),
        "PUZZLE_COMPLETED" => Inbound::TaskCompleted {
            device,
            task: TaskId::Wire,
        },
        "MAZE_COMPLETED" => Inbound::TaskCompleted {
            device,
            task: TaskId::Maze,
        },
        "BUTTON_GAME_WON" => Inbound::TaskCompleted {
            device,
            task: TaskId::Button,
        },
        "TIMER_FINISHED" => Inbound::TimerFinished(device),
        _ => Inbound::Other { device, kind },
    };

    debug!(?inbound, "classify: parsed line");
    Ok(inbound)
}
