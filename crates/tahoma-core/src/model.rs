// ── Domain model ──
//
// Devices and execution states as the rest of the workspace sees them.
// Wire types from tahoma-api are converted at the edge.

use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

use tahoma_api::{RawDevice, StateEntry};

/// Closure percentage, 0 = open, 100 = closed.
pub const STATE_CLOSURE: &str = "core:ClosureState";
/// `"open"` / `"closed"`.
pub const STATE_OPEN_CLOSED: &str = "core:OpenClosedState";

// ── Device ───────────────────────────────────────────────────────────

/// A device of the setup. Identity is `url`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub url: String,
    pub label: String,
    pub controllable_name: Option<String>,
    /// Capability descriptor, passed through untouched.
    pub definition: Value,
    pub states: HashMap<String, Value>,
}

impl Device {
    pub fn state(&self, name: &str) -> Option<&Value> {
        self.states.get(name)
    }

    /// Overwrite the given states, last write wins.
    pub fn merge_states(&mut self, states: &[StateValue]) {
        for s in states {
            self.states.insert(s.name.clone(), s.value.clone());
        }
    }
}

impl From<RawDevice> for Device {
    fn from(raw: RawDevice) -> Self {
        Self {
            url: raw.device_url,
            label: raw.label,
            controllable_name: raw.controllable_name,
            definition: raw.definition,
            states: raw.states.into_iter().map(|s| (s.name, s.value)).collect(),
        }
    }
}

/// One named state value carried by a state-change notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateValue {
    pub name: String,
    pub value: Value,
}

impl From<StateEntry> for StateValue {
    fn from(entry: StateEntry) -> Self {
        Self {
            name: entry.name,
            value: entry.value,
        }
    }
}

// ── Execution state ──────────────────────────────────────────────────

/// Lifecycle state of a server-side execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Initialized,
    NotTransmitted,
    Transmitted,
    InProgress,
    Completed,
    Failed,
    /// A state name this client does not know. Treated as non-terminal.
    Unknown(String),
}

impl ExecutionState {
    /// Parse the server's upper-snake-case state name.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "INITIALIZED" => Self::Initialized,
            "NOT_TRANSMITTED" => Self::NotTransmitted,
            "TRANSMITTED" => Self::Transmitted,
            "IN_PROGRESS" => Self::InProgress,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            other => Self::Unknown(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::NotTransmitted => "NOT_TRANSMITTED",
            Self::Transmitted => "TRANSMITTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Unknown(raw) => raw,
        }
    }

    /// `COMPLETED` and `FAILED` end an execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExecutionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Terminal result of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub exec_id: String,
    pub state: ExecutionState,
    /// Server failure code when `state` is `FAILED`.
    pub failure_type: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == ExecutionState::Completed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execution_states_round_trip_through_names() {
        for name in [
            "INITIALIZED",
            "NOT_TRANSMITTED",
            "TRANSMITTED",
            "IN_PROGRESS",
            "COMPLETED",
            "FAILED",
            "QUEUED_GATEWAY_SIDE",
        ] {
            assert_eq!(ExecutionState::parse(name).as_str(), name);
        }
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(ExecutionState::Completed.is_terminal());
        assert!(ExecutionState::Failed.is_terminal());
        assert!(!ExecutionState::InProgress.is_terminal());
        assert!(!ExecutionState::parse("SOMETHING_NEW").is_terminal());
    }

    #[test]
    fn device_from_raw_flattens_states() {
        let raw: RawDevice = serde_json::from_value(json!({
            "deviceURL": "io://1234/1",
            "label": "Blind",
            "definition": {},
            "states": [{ "name": STATE_CLOSURE, "type": 1, "value": 20 }]
        }))
        .unwrap();
        let device = Device::from(raw);
        assert_eq!(device.url, "io://1234/1");
        assert_eq!(device.state(STATE_CLOSURE), Some(&json!(20)));
    }

    #[test]
    fn merge_states_overwrites_existing() {
        let mut device = Device {
            url: "io://1234/1".into(),
            label: "Blind".into(),
            controllable_name: None,
            definition: Value::Null,
            states: HashMap::from([(STATE_CLOSURE.to_owned(), json!(0))]),
        };
        device.merge_states(&[
            StateValue {
                name: STATE_CLOSURE.into(),
                value: json!(100),
            },
            StateValue {
                name: STATE_OPEN_CLOSED.into(),
                value: json!("closed"),
            },
        ]);
        assert_eq!(device.state(STATE_CLOSURE), Some(&json!(100)));
        assert_eq!(device.state(STATE_OPEN_CLOSED), Some(&json!("closed")));
    }
}
