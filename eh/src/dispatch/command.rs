//! Outbound coordination commands

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::DeviceId;

/// The five commands the hub ever broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Activate,
    Pause,
    Resume,
    GameOver,
    Victory,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "ACTIVATE",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::GameOver => "GAME_OVER",
            Self::Victory => "VICTORY",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command plus its JSON payload
///
/// Receivers key off either `type` or `command`, so both always carry the kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: CommandKind,
    payload: Map<String, Value>,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        let mut payload = Map::new();
        payload.insert("type".to_string(), Value::from(kind.as_str()));
        payload.insert("command".to_string(), Value::from(kind.as_str()));
        Self { kind, payload }
    }

    /// Attach an extra payload field
    ///
    /// `type` and `command` are reserved and cannot be overwritten.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if key != "type" && key != "command" {
            self.payload.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn payload(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

/// A command addressed to a set of devices
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub command: Command,
    pub targets: Vec<DeviceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_and_command_match() {
        let cmd = Command::new(CommandKind::GameOver);
        let payload = cmd.payload();
        assert_eq!(payload["type"], "GAME_OVER");
        assert_eq!(payload["command"], "GAME_OVER");
    }

    #[test]
    fn test_with_adds_fields_but_not_reserved_keys() {
        let cmd = Command::new(CommandKind::Activate)
            .with("duration", 300)
            .with("type", "NOPE");

        assert_eq!(cmd.field("duration"), Some(&Value::from(300)));
        assert_eq!(cmd.payload()["type"], "ACTIVATE");
    }

    #[test]
    fn test_kind_serializes_screaming() {
        let json = serde_json::to_string(&CommandKind::GameOver).unwrap();
        assert_eq!(json, r#""GAME_OVER""#);
    }
}
