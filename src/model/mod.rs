//! Command and capability data model
//!
//! The command record, its lifecycle status, the JSON envelopes both
//! transports speak, and the capability descriptor advertised to clients.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Lifecycle status of a command.
///
/// Transitions are strictly forward-moving:
/// `QUEUED -> RUNNING -> {SUCCEEDED | FAILED}`. Once a terminal status is
/// reached no further transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Queued => "QUEUED",
            CommandStatus::Running => "RUNNING",
            CommandStatus::Succeeded => "SUCCEEDED",
            CommandStatus::Failed => "FAILED",
        }
    }

    /// SUCCEEDED and FAILED are terminal: no further transition follows.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Succeeded | CommandStatus::Failed)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command received from a client.
///
/// Created by the router on admission and retained for the lifetime of the
/// process to answer later status queries. `result` is only meaningful on
/// SUCCEEDED, `error` only on FAILED; a QUEUED or RUNNING command carries
/// neither.
#[derive(Debug, Clone)]
pub struct Command {
    pub id: String,
    pub idempotency_key: String,
    pub command_type: String,
    pub payload: Option<Value>,
    pub status: CommandStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Command {
    /// HTTP response envelope: `{commandId, status, result|null, error|null}`.
    pub fn to_response_json(&self) -> Value {
        json!({
            "commandId": self.id,
            "status": self.status.as_str(),
            "result": self.result.clone().unwrap_or(Value::Null),
            "error": self.error.clone().map_or(Value::Null, Value::String),
        })
    }

    /// WebSocket event envelope: the response envelope plus an `event` tag.
    pub fn to_event_json(&self) -> Value {
        json!({
            "event": "COMMAND_STATUS",
            "commandId": self.id,
            "status": self.status.as_str(),
            "result": self.result.clone().unwrap_or(Value::Null),
            "error": self.error.clone().map_or(Value::Null, Value::String),
        })
    }
}

/// Per-command-type enable flags, advertised to clients so they can adapt
/// their UI without guessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    pub reset_fuse: bool,
    pub toggle_generator_group: bool,
    pub toggle_building: bool,
    pub set_recipe: bool,
    pub set_overclock: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            reset_fuse: true,
            toggle_generator_group: true,
            toggle_building: true,
            set_recipe: true,
            set_overclock: true,
        }
    }
}

/// Admission limits advertised alongside the feature flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub commands_per_second: u32,
}

/// Versioned, read-only snapshot of what the gateway currently accepts.
///
/// Exposed on a single unauthenticated GET endpoint; capability discovery
/// must work before a client has a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub version: String,
    pub features: FeatureFlags,
    pub limits: Limits,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            features: FeatureFlags::default(),
            limits: Limits {
                commands_per_second: 5,
            },
        }
    }
}
