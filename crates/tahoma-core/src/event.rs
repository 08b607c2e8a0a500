// ── Connection events ──
//
// Everything a Connection publishes on its broadcast channel.

use std::sync::Arc;

use serde::Serialize;

use crate::model::{Device, ExecutionState, StateValue};

/// Notification emitted by a [`Connection`](crate::Connection).
///
/// Delivered through a `tokio::sync::broadcast` channel; slow subscribers
/// lag and lose the oldest events rather than blocking the pollers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Session became valid (`true`) or was found expired (`false`).
    LoggedChanged { logged: bool },
    /// The device list was replaced by a refresh cycle.
    DevicesRefreshed { devices: Arc<Vec<Arc<Device>>> },
    /// New values for some (or, after a refresh, all) states of a device.
    DeviceStateChanged {
        device_url: String,
        states: Vec<StateValue>,
    },
    /// An execution on a device moved to a new state.
    ExecStateChanged {
        device_url: String,
        change: ExecStateChange,
    },
}

/// Execution progress payload of [`ConnectionEvent::ExecStateChanged`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecStateChange {
    pub exec_id: String,
    pub new_state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_type: Option<String>,
}
