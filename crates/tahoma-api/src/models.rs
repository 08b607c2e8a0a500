// Wire types for the end-user API.
//
// Field names follow the server's camelCase JSON; the device identifier
// is always spelled `deviceURL` on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Simple action command type (`type: 1` on the wire).
pub const COMMAND_TYPE_ACTION: u8 = 1;

// ── Session ─────────────────────────────────────────────────────────

/// Response body of `POST /login`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error payload carried by non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorPayload {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

// ── Events ──────────────────────────────────────────────────────────

/// Response body of `POST /events/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerRegistration {
    pub id: String,
}

/// One record from an event fetch.
///
/// Only `name` is guaranteed; which of the other fields are present
/// depends on the event type. Everything else the server sends is kept in
/// `extra` so unknown event types can still be logged in full.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub name: String,
    #[serde(rename = "deviceURL", default, skip_serializing_if = "Option::is_none")]
    pub device_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_states: Option<Vec<StateEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_next_state: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ── Setup ───────────────────────────────────────────────────────────

/// A named device state as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub name: String,
    /// Server-side value type tag (1 = int, 2 = float, 3 = string, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<i64>,
    #[serde(default)]
    pub value: Value,
}

/// A device entry from `GET /setup/devices`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDevice {
    #[serde(rename = "deviceURL")]
    pub device_url: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub controllable_name: Option<String>,
    #[serde(default)]
    pub definition: Value,
    #[serde(default)]
    pub states: Vec<StateEntry>,
    #[serde(default)]
    pub available: Option<bool>,
}

/// Response body of the single-state query.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StateValue {
    #[serde(default)]
    pub value: Value,
}

// ── Executions ──────────────────────────────────────────────────────

/// A single command inside an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

impl CommandRecord {
    /// A simple action command.
    pub fn action(name: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            kind: COMMAND_TYPE_ACTION,
            parameters,
        }
    }
}

/// Commands addressed to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "deviceURL")]
    pub device_url: String,
    pub commands: Vec<CommandRecord>,
}

/// Body of `POST /exec/apply`.
///
/// `metadata` is always serialized, as an explicit `null` when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEnvelope {
    pub label: String,
    pub metadata: Option<Value>,
    pub actions: Vec<Action>,
}

impl ExecutionEnvelope {
    /// Envelope with one action group holding one device and one command.
    pub fn single(
        label: impl Into<String>,
        device_url: impl Into<String>,
        command: CommandRecord,
    ) -> Self {
        Self {
            label: label.into(),
            metadata: None,
            actions: vec![Action {
                device_url: device_url.into(),
                commands: vec![command],
            }],
        }
    }
}

/// Response body of `POST /exec/apply`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecApplied {
    pub exec_id: String,
}

/// Response body of `GET /exec/current/{execId}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentExecution {
    #[serde(default)]
    pub action_group: Option<ActionGroup>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionGroup {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionRef {
    #[serde(rename = "deviceURL")]
    pub device_url: String,
}

impl CurrentExecution {
    /// Device of the first action in the group.
    ///
    /// Action groups spanning several devices resolve to the first one only.
    pub fn first_device_url(&self) -> Option<&str> {
        self.action_group
            .as_ref()?
            .actions
            .first()
            .map(|a| a.device_url.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CAPTURED_ENVELOPE: &str = r#"{"label":"tahoma command","metadata":null,"actions":[{"deviceURL":"io://1234-5678-9012/1234567","commands":[{"name":"open","type":1,"parameters":[]}]}]}"#;

    #[test]
    fn envelope_serializes_in_wire_order_with_null_metadata() {
        let envelope = ExecutionEnvelope::single(
            "tahoma command",
            "io://1234-5678-9012/1234567",
            CommandRecord::action("open", Vec::new()),
        );
        assert_eq!(serde_json::to_string(&envelope).unwrap(), CAPTURED_ENVELOPE);
    }

    #[test]
    fn captured_envelope_resubmits_byte_for_byte() {
        let parsed: ExecutionEnvelope = serde_json::from_str(CAPTURED_ENVELOPE).unwrap();
        assert_eq!(parsed.metadata, None);
        assert_eq!(parsed.actions[0].commands[0].kind, COMMAND_TYPE_ACTION);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), CAPTURED_ENVELOPE);
    }

    #[test]
    fn command_parameters_keep_their_json_types() {
        let cmd = CommandRecord::action("setClosure", vec![json!(17)]);
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({ "name": "setClosure", "type": 1, "parameters": [17] })
        );
    }

    #[test]
    fn event_record_keeps_unknown_fields() {
        let record: EventRecord = serde_json::from_value(json!({
            "name": "GatewaySynchronizationStartedEvent",
            "gatewayId": "1234-5678-9012",
            "timestamp": 1_700_000_000_000_i64
        }))
        .unwrap();
        assert_eq!(record.name, "GatewaySynchronizationStartedEvent");
        assert!(record.device_url.is_none());
        assert_eq!(record.extra["gatewayId"], "1234-5678-9012");
    }

    #[test]
    fn execution_event_fields_deserialize() {
        let record: EventRecord = serde_json::from_value(json!({
            "name": "ExecutionStateChangedEvent",
            "execId": "E1",
            "oldState": "TRANSMITTED",
            "newState": "IN_PROGRESS",
            "timeToNextState": 0
        }))
        .unwrap();
        assert_eq!(record.exec_id.as_deref(), Some("E1"));
        assert_eq!(record.new_state.as_deref(), Some("IN_PROGRESS"));
        assert_eq!(record.time_to_next_state, Some(0));
    }

    #[test]
    fn first_device_url_ignores_later_actions() {
        let current: CurrentExecution = serde_json::from_value(json!({
            "actionGroup": {
                "label": "scene",
                "actions": [
                    { "deviceURL": "io://a/1", "commands": [] },
                    { "deviceURL": "io://a/2", "commands": [] }
                ]
            }
        }))
        .unwrap();
        assert_eq!(current.first_device_url(), Some("io://a/1"));
        assert_eq!(CurrentExecution::default().first_device_url(), None);
    }
}
