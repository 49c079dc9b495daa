//! Device identities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when an identity string names no known module or task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub value: String,
}

/// One of the game modules wired to the hub
///
/// The legacy module names (`esp`, `esp2`, `esp3`, `esp4`) are accepted as
/// aliases so older firmware can keep identifying itself the old way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceId {
    /// Wire-cutting puzzle
    #[serde(alias = "esp")]
    Wire,
    /// Countdown timer
    #[serde(alias = "esp2")]
    Timer,
    /// Tilt maze
    #[serde(alias = "esp3")]
    Maze,
    /// Button timing game
    #[serde(alias = "esp4")]
    Button,
}

impl DeviceId {
    /// Every known module, in wiring order
    pub const ALL: [DeviceId; 4] = [DeviceId::Wire, DeviceId::Timer, DeviceId::Maze, DeviceId::Button];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wire => "wire",
            Self::Timer => "timer",
            Self::Maze => "maze",
            Self::Button => "button",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wire" | "esp" => Ok(Self::Wire),
            "timer" | "esp2" => Ok(Self::Timer),
            "maze" | "esp3" => Ok(Self::Maze),
            "button" | "esp4" => Ok(Self::Button),
            _ => Err(ParseIdError {
                kind: "device",
                value: s.to_string(),
            }),
        }
    }
}
