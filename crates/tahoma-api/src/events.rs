// Event listener endpoints
//
// A listener must be registered before `fetch` returns anything. The
// server holds a fetch open until events arrive or its own timeout fires.

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::TahomaClient;
use crate::error::Error;
use crate::models::{EventRecord, ListenerRegistration};

impl TahomaClient {
    /// Register a new event listener and return its id.
    ///
    /// `POST /events/register`
    pub async fn register_listener(&self) -> Result<String, Error> {
        let url = self.endpoint_url(&["events", "register"])?;
        debug!("registering event listener");
        let reg: ListenerRegistration = self.post(url).await?;
        Ok(reg.id)
    }

    /// Drop a listener registration.
    ///
    /// `POST /events/{id}/unregister`
    pub async fn unregister_listener(&self, listener_id: &str) -> Result<(), Error> {
        let url = self.endpoint_url(&["events", listener_id, "unregister"])?;
        debug!(listener_id, "unregistering event listener");
        self.post_empty(url).await
    }

    /// Drain pending events for a listener, in delivery order.
    ///
    /// Records are decoded one at a time; a record that does not fit
    /// [`EventRecord`] is logged and skipped so the rest of the batch
    /// still arrives.
    ///
    /// `POST /events/{id}/fetch`
    pub async fn fetch_events(&self, listener_id: &str) -> Result<Vec<EventRecord>, Error> {
        let url = self.endpoint_url(&["events", listener_id, "fetch"])?;
        let batch: Vec<Value> = self.post(url).await?;
        Ok(decode_batch(batch))
    }
}

fn decode_batch(batch: Vec<Value>) -> Vec<EventRecord> {
    batch
        .into_iter()
        .filter_map(|raw| {
            let name = raw.get("name").and_then(Value::as_str).map(str::to_owned);
            match serde_json::from_value::<EventRecord>(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(name = ?name, error = %e, "skipping malformed event record");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn malformed_records_are_skipped_in_place() {
        let records = decode_batch(vec![
            json!({ "name": "SomeFutureEvent", "timeToNextState": 1.5 }),
            json!({ "deviceURL": "io://a/1" }),
            json!({ "name": "DeviceStateChangedEvent", "deviceURL": "io://a/1", "deviceStates": "open" }),
            json!({ "name": "ExecutionRegisteredEvent", "execId": "E1" }),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ExecutionRegisteredEvent");
        assert_eq!(records[0].exec_id.as_deref(), Some("E1"));
    }
}
