//! Task identities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::device::ParseIdError;

/// A puzzle whose completion counts toward victory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    Wire,
    Maze,
    Button,
}

impl TaskId {
    pub const ALL: [TaskId; 3] = [TaskId::Wire, TaskId::Maze, TaskId::Button];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wire => "wire",
            Self::Maze => "maze",
            Self::Button => "button",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wire" => Ok(Self::Wire),
            "maze" => Ok(Self::Maze),
            "button" => Ok(Self::Button),
            _ => Err(ParseIdError {
                kind: "task",
                value: s.to_string(),
            }),
        }
    }
}
