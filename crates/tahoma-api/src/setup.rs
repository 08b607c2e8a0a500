// Setup endpoints: device list, state refresh trigger, single-state query.

use serde_json::Value;
use tracing::debug;

use crate::client::TahomaClient;
use crate::error::Error;
use crate::models::{RawDevice, StateValue};

impl TahomaClient {
    /// List every device of the setup with its current states.
    ///
    /// `GET /setup/devices`
    pub async fn list_devices(&self) -> Result<Vec<RawDevice>, Error> {
        let url = self.endpoint_url(&["setup", "devices"])?;
        debug!("listing devices");
        self.get(url).await
    }

    /// Ask the gateway to re-read device states.
    ///
    /// `PUT /setup/devices/states/refresh`
    ///
    /// The refresh completes asynchronously; a `GET /setup/devices` issued
    /// right away may still return the previous values.
    pub async fn refresh_states(&self) -> Result<(), Error> {
        let url = self.endpoint_url(&["setup", "devices", "states", "refresh"])?;
        debug!("requesting state refresh");
        self.put_empty(url).await
    }

    /// Read one state of one device.
    ///
    /// `GET /setup/devices/{deviceURL}/states/{stateName}`
    pub async fn get_state(&self, device_url: &str, state_name: &str) -> Result<Value, Error> {
        let url = self.endpoint_url(&["setup", "devices", device_url, "states", state_name])?;
        debug!(device_url, state_name, "querying state");
        let state: StateValue = self.get(url).await?;
        Ok(state.value)
    }
}
