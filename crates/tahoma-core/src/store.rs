// ── Device store ──
//
// The authoritative device list of a Connection. The whole list lives in
// one `watch` channel so a refresh replaces it in a single step and
// readers always see a consistent snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::model::{Device, StateValue};

pub(crate) struct DeviceStore {
    devices: watch::Sender<Arc<Vec<Arc<Device>>>>,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
}

impl DeviceStore {
    pub(crate) fn new() -> Self {
        let (devices, _) = watch::channel(Arc::new(Vec::new()));
        let (last_refresh, _) = watch::channel(None);
        Self {
            devices,
            last_refresh,
        }
    }

    /// Replace the whole list, keeping the server's order.
    pub(crate) fn replace_all(&self, devices: Vec<Device>) -> Arc<Vec<Arc<Device>>> {
        let snapshot: Arc<Vec<Arc<Device>>> =
            Arc::new(devices.into_iter().map(Arc::new).collect());
        // `send_replace` updates even with zero receivers.
        self.devices.send_replace(Arc::clone(&snapshot));
        self.last_refresh.send_replace(Some(Utc::now()));
        snapshot
    }

    /// Merge states into one device. Returns `false` if the device is not
    /// in the list.
    pub(crate) fn apply_states(&self, device_url: &str, states: &[StateValue]) -> bool {
        self.devices.send_if_modified(|snapshot| {
            let Some(idx) = snapshot.iter().position(|d| d.url == device_url) else {
                return false;
            };
            let list = Arc::make_mut(snapshot);
            Arc::make_mut(&mut list[idx]).merge_states(states);
            true
        })
    }

    pub(crate) fn get(&self, device_url: &str) -> Option<Arc<Device>> {
        self.devices
            .borrow()
            .iter()
            .find(|d| d.url == device_url)
            .cloned()
    }

    pub(crate) fn find_by_label(&self, label: &str) -> Option<Arc<Device>> {
        self.devices
            .borrow()
            .iter()
            .find(|d| d.label == label)
            .cloned()
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.devices.subscribe()
    }

    pub(crate) fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }
}
