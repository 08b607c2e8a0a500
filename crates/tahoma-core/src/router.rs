// ── Event classification ──
//
// Turns raw event records into the handful of cases the Connection acts
// on. Pure; the Connection does the side effects.

use tahoma_api::EventRecord;

use crate::model::{ExecutionState, StateValue};

/// Event names the Connection knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    DeviceStateChanged,
    ExecutionStateChanged,
    CommandExecutionStateChanged,
    RefreshAllDevicesStatesCompleted,
    DeviceUnavailable,
    Unknown,
}

impl EventKind {
    pub(crate) fn from_name(name: &str) -> Self {
        match name {
            "DeviceStateChangedEvent" => Self::DeviceStateChanged,
            "ExecutionStateChangedEvent" => Self::ExecutionStateChanged,
            "CommandExecutionStateChangedEvent" => Self::CommandExecutionStateChanged,
            "RefreshAllDevicesStatesCompletedEvent" => Self::RefreshAllDevicesStatesCompleted,
            "DeviceUnavailableEvent" => Self::DeviceUnavailable,
            _ => Self::Unknown,
        }
    }
}

/// What to do with one event record.
#[derive(Debug)]
pub(crate) enum Routed {
    DeviceState {
        device_url: String,
        states: Vec<StateValue>,
    },
    Execution {
        exec_id: String,
        new_state: ExecutionState,
        failure_type: Option<String>,
    },
    /// Known, deliberately not acted upon.
    Ignored { name: String },
    Unknown(EventRecord),
    /// Known name but a required field is missing.
    Malformed {
        name: String,
        missing: &'static str,
    },
}

pub(crate) fn classify(record: EventRecord) -> Routed {
    match EventKind::from_name(&record.name) {
        EventKind::DeviceStateChanged => {
            let Some(device_url) = record.device_url else {
                return Routed::Malformed {
                    name: record.name,
                    missing: "deviceURL",
                };
            };
            let states = record
                .device_states
                .unwrap_or_default()
                .into_iter()
                .map(StateValue::from)
                .collect();
            Routed::DeviceState { device_url, states }
        }
        EventKind::ExecutionStateChanged | EventKind::CommandExecutionStateChanged => {
            let Some(exec_id) = record.exec_id else {
                return Routed::Malformed {
                    name: record.name,
                    missing: "execId",
                };
            };
            let Some(new_state) = record.new_state else {
                return Routed::Malformed {
                    name: record.name,
                    missing: "newState",
                };
            };
            Routed::Execution {
                exec_id,
                new_state: ExecutionState::parse(&new_state),
                failure_type: record.failure_type,
            }
        }
        EventKind::RefreshAllDevicesStatesCompleted | EventKind::DeviceUnavailable => {
            Routed::Ignored { name: record.name }
        }
        EventKind::Unknown => Routed::Unknown(record),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> EventRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn device_state_event_carries_states() {
        let routed = classify(record(json!({
            "name": "DeviceStateChangedEvent",
            "deviceURL": "io://1234/1",
            "deviceStates": [
                { "name": "core:ClosureState", "type": 1, "value": 55 }
            ]
        })));
        match routed {
            Routed::DeviceState { device_url, states } => {
                assert_eq!(device_url, "io://1234/1");
                assert_eq!(states.len(), 1);
                assert_eq!(states[0].value, json!(55));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn both_execution_event_names_route_the_same() {
        for name in [
            "ExecutionStateChangedEvent",
            "CommandExecutionStateChangedEvent",
        ] {
            let routed = classify(record(json!({
                "name": name,
                "execId": "E1",
                "newState": "FAILED",
                "failureType": "NONEXEC_OTHER"
            })));
            match routed {
                Routed::Execution {
                    exec_id,
                    new_state,
                    failure_type,
                } => {
                    assert_eq!(exec_id, "E1");
                    assert_eq!(new_state, ExecutionState::Failed);
                    assert_eq!(failure_type.as_deref(), Some("NONEXEC_OTHER"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn refresh_completed_and_unavailable_are_ignored() {
        for name in [
            "RefreshAllDevicesStatesCompletedEvent",
            "DeviceUnavailableEvent",
        ] {
            let routed = classify(record(json!({ "name": name, "deviceURL": "io://1234/1" })));
            assert!(matches!(routed, Routed::Ignored { .. }));
        }
    }

    #[test]
    fn unknown_names_are_kept_for_logging() {
        let routed = classify(record(json!({
            "name": "GatewayAliveEvent",
            "gatewayId": "1234"
        })));
        match routed {
            Routed::Unknown(rec) => assert_eq!(rec.extra["gatewayId"], "1234"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_fields_are_malformed() {
        let routed = classify(record(json!({ "name": "DeviceStateChangedEvent" })));
        assert!(matches!(
            routed,
            Routed::Malformed {
                missing: "deviceURL",
                ..
            }
        ));

        let routed = classify(record(json!({
            "name": "ExecutionStateChangedEvent",
            "execId": "E1"
        })));
        assert!(matches!(
            routed,
            Routed::Malformed {
                missing: "newState",
                ..
            }
        ));
    }
}
