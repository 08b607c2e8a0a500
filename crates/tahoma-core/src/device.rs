// ── Device handle ──
//
// Follows one device of a Connection and projects the connection's events
// into a small observable view: resolved identity, current states, and the
// online / executing flags a device façade displays.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tahoma_api::CommandRecord;

use crate::connection::{Connection, ExecutionHandle};
use crate::error::CoreError;
use crate::event::ConnectionEvent;
use crate::model::{Device, StateValue};

/// How a handle picks its device out of the connection's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Url(String),
    Label(String),
}

impl DeviceSelector {
    fn matches(&self, device: &Device) -> bool {
        match self {
            Self::Url(url) => device.url == *url,
            Self::Label(label) => device.label == *label,
        }
    }
}

/// Observable state of one followed device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceView {
    /// `None` until the device shows up in a refresh.
    pub url: Option<String>,
    pub label: Option<String>,
    pub controllable_name: Option<String>,
    pub definition: Value,
    pub states: HashMap<String, Value>,
    /// State names whose value changed in the last update.
    pub changed: Vec<String>,
    pub online: bool,
    pub executing: bool,
}

impl DeviceView {
    pub fn state(&self, name: &str) -> Option<&Value> {
        self.states.get(name)
    }

    /// Re-pick the device from a fresh list. Returns whether anything
    /// visible changed.
    pub(crate) fn resolve(
        &mut self,
        selector: &DeviceSelector,
        devices: &[Arc<Device>],
        logged: bool,
    ) -> bool {
        let before = self.clone();
        self.changed.clear();

        match devices.iter().find(|d| selector.matches(d)) {
            Some(device) => {
                if self.url.as_deref() != Some(device.url.as_str()) {
                    self.states = device.states.clone();
                    self.changed = device.states.keys().cloned().collect();
                    self.executing = false;
                }
                self.url = Some(device.url.clone());
                self.label = Some(device.label.clone());
                self.controllable_name.clone_from(&device.controllable_name);
                self.definition = device.definition.clone();
                self.online = logged;
            }
            None => {
                *self = Self::default();
            }
        }

        *self != before
    }

    /// Fold one connection event into the view. Returns whether anything
    /// visible changed.
    pub(crate) fn apply_event(
        &mut self,
        selector: &DeviceSelector,
        event: &ConnectionEvent,
        logged: bool,
    ) -> bool {
        match event {
            ConnectionEvent::DevicesRefreshed { devices } => self.resolve(selector, devices, logged),
            ConnectionEvent::DeviceStateChanged { device_url, states } => {
                if self.url.as_deref() == Some(device_url.as_str()) {
                    self.merge_states(states)
                } else {
                    false
                }
            }
            ConnectionEvent::ExecStateChanged { device_url, change } => {
                if self.url.as_deref() != Some(device_url.as_str()) {
                    return false;
                }
                let executing = !change.new_state.is_terminal();
                let changed = self.executing != executing;
                self.executing = executing;
                changed
            }
            ConnectionEvent::LoggedChanged { logged } => {
                let online = *logged && self.url.is_some();
                let executing = self.executing && *logged;
                let changed = self.online != online || self.executing != executing;
                self.online = online;
                self.executing = executing;
                changed
            }
        }
    }

    /// Merge states, recording which keys actually changed value.
    fn merge_states(&mut self, states: &[StateValue]) -> bool {
        self.changed.clear();
        for s in states {
            if self.states.get(&s.name) != Some(&s.value) {
                self.states.insert(s.name.clone(), s.value.clone());
                self.changed.push(s.name.clone());
            }
        }
        !self.changed.is_empty()
    }
}

/// Live view of one device of a [`Connection`].
///
/// Spawns a task that follows the connection's events; dropping the handle
/// (or closing the connection) stops it. Must be created inside a Tokio
/// runtime.
pub struct DeviceHandle {
    connection: Connection,
    selector: DeviceSelector,
    view: watch::Receiver<DeviceView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DeviceHandle {
    pub fn attach(connection: &Connection, selector: DeviceSelector) -> Self {
        let mut initial = DeviceView::default();
        initial.resolve(
            &selector,
            &connection.devices_snapshot(),
            connection.is_logged(),
        );
        initial.changed.clear();

        let (view_tx, view) = watch::channel(initial);
        let cancel = connection.child_token();
        let task = tokio::spawn(follow_task(
            connection.clone(),
            selector.clone(),
            connection.subscribe(),
            view_tx,
            cancel.clone(),
        ));

        Self {
            connection: connection.clone(),
            selector,
            view,
            cancel,
            task: Some(task),
        }
    }

    pub fn selector(&self) -> &DeviceSelector {
        &self.selector
    }

    /// Current view (cloned).
    pub fn view(&self) -> DeviceView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceView> {
        self.view.clone()
    }

    pub fn device_url(&self) -> Option<String> {
        self.view.borrow().url.clone()
    }

    pub fn state(&self, name: &str) -> Option<Value> {
        self.view.borrow().state(name).cloned()
    }

    pub fn is_online(&self) -> bool {
        self.view.borrow().online
    }

    pub fn is_executing(&self) -> bool {
        self.view.borrow().executing
    }

    /// Run a command on the followed device.
    ///
    /// Fails with [`CoreError::DeviceNotInitialized`] until the device has
    /// been resolved from a refresh.
    pub async fn execute(
        &self,
        name: &str,
        parameters: Vec<Value>,
    ) -> Result<ExecutionHandle, CoreError> {
        let Some(url) = self.device_url() else {
            return Err(CoreError::DeviceNotInitialized);
        };
        self.connection
            .execute_command(&url, CommandRecord::action(name, parameters))
            .await
    }

    /// Stop following and wait for the task to finish.
    pub async fn detach(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn follow_task(
    connection: Connection,
    selector: DeviceSelector,
    mut events: broadcast::Receiver<ConnectionEvent>,
    view: watch::Sender<DeviceView>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    let logged = connection.is_logged();
                    view.send_if_modified(|v| v.apply_event(&selector, &event, logged));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, selector = ?selector, "device handle lagged, resyncing");
                    let devices = connection.devices_snapshot();
                    let logged = connection.is_logged();
                    view.send_modify(|v| {
                        *v = DeviceView::default();
                        v.resolve(&selector, &devices, logged);
                    });
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!(selector = ?selector, "device handle stopped");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::event::ExecStateChange;
    use crate::model::{ExecutionState, STATE_CLOSURE, STATE_OPEN_CLOSED};

    fn blind(url: &str, label: &str) -> Arc<Device> {
        Arc::new(Device {
            url: url.into(),
            label: label.into(),
            controllable_name: Some("io:RollerShutterGenericIOComponent".into()),
            definition: json!({ "commands": [] }),
            states: HashMap::from([(STATE_CLOSURE.to_owned(), json!(0))]),
        })
    }

    fn refreshed(devices: Vec<Arc<Device>>) -> ConnectionEvent {
        ConnectionEvent::DevicesRefreshed {
            devices: Arc::new(devices),
        }
    }

    fn exec(url: &str, state: ExecutionState) -> ConnectionEvent {
        ConnectionEvent::ExecStateChanged {
            device_url: url.into(),
            change: ExecStateChange {
                exec_id: "E1".into(),
                new_state: state,
                failure_type: None,
            },
        }
    }

    #[test]
    fn resolves_by_label_on_refresh() {
        let selector = DeviceSelector::Label("Kitchen".into());
        let mut view = DeviceView::default();

        let changed = view.apply_event(
            &selector,
            &refreshed(vec![blind("io://a/1", "Hall"), blind("io://a/2", "Kitchen")]),
            true,
        );

        assert!(changed);
        assert_eq!(view.url.as_deref(), Some("io://a/2"));
        assert!(view.online);
        assert_eq!(view.state(STATE_CLOSURE), Some(&json!(0)));
    }

    #[test]
    fn device_missing_from_refresh_goes_offline() {
        let selector = DeviceSelector::Url("io://a/1".into());
        let mut view = DeviceView::default();
        view.apply_event(&selector, &refreshed(vec![blind("io://a/1", "Hall")]), true);

        view.apply_event(&selector, &refreshed(vec![blind("io://a/9", "Other")]), true);

        assert_eq!(view.url, None);
        assert!(!view.online);
    }

    #[test]
    fn state_changes_record_only_changed_keys() {
        let selector = DeviceSelector::Url("io://a/1".into());
        let mut view = DeviceView::default();
        view.apply_event(&selector, &refreshed(vec![blind("io://a/1", "Hall")]), true);

        let changed = view.apply_event(
            &selector,
            &ConnectionEvent::DeviceStateChanged {
                device_url: "io://a/1".into(),
                states: vec![
                    StateValue {
                        name: STATE_CLOSURE.into(),
                        value: json!(0),
                    },
                    StateValue {
                        name: STATE_OPEN_CLOSED.into(),
                        value: json!("open"),
                    },
                ],
            },
            true,
        );

        assert!(changed);
        assert_eq!(view.changed, vec![STATE_OPEN_CLOSED.to_owned()]);
    }

    #[test]
    fn other_devices_are_ignored() {
        let selector = DeviceSelector::Url("io://a/1".into());
        let mut view = DeviceView::default();
        view.apply_event(&selector, &refreshed(vec![blind("io://a/1", "Hall")]), true);

        assert!(!view.apply_event(&selector, &exec("io://a/2", ExecutionState::InProgress), true));
        assert!(!view.executing);
    }

    #[test]
    fn executing_follows_execution_states() {
        let selector = DeviceSelector::Url("io://a/1".into());
        let mut view = DeviceView::default();
        view.apply_event(&selector, &refreshed(vec![blind("io://a/1", "Hall")]), true);

        assert!(view.apply_event(&selector, &exec("io://a/1", ExecutionState::InProgress), true));
        assert!(view.executing);
        assert!(view.apply_event(&selector, &exec("io://a/1", ExecutionState::Completed), true));
        assert!(!view.executing);
    }

    #[test]
    fn logout_clears_online_and_executing() {
        let selector = DeviceSelector::Url("io://a/1".into());
        let mut view = DeviceView::default();
        view.apply_event(&selector, &refreshed(vec![blind("io://a/1", "Hall")]), true);
        view.apply_event(&selector, &exec("io://a/1", ExecutionState::Transmitted), true);

        let changed =
            view.apply_event(&selector, &ConnectionEvent::LoggedChanged { logged: false }, false);

        assert!(changed);
        assert!(!view.online);
        assert!(!view.executing);

        view.apply_event(&selector, &ConnectionEvent::LoggedChanged { logged: true }, true);
        assert!(view.online);
    }
}
