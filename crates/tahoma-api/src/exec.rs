// Execution endpoints: submit, look up, cancel.

use tracing::debug;

use crate::client::TahomaClient;
use crate::error::Error;
use crate::models::{CurrentExecution, ExecApplied, ExecutionEnvelope};

impl TahomaClient {
    /// Submit an execution and return the server-assigned exec id.
    ///
    /// `POST /exec/apply`
    ///
    /// The response only acknowledges the submission; the outcome arrives
    /// later as `ExecutionStateChangedEvent`s on the listener.
    pub async fn apply_execution(&self, envelope: &ExecutionEnvelope) -> Result<String, Error> {
        let url = self.endpoint_url(&["exec", "apply"])?;
        debug!(label = %envelope.label, actions = envelope.actions.len(), "applying execution");
        let applied: ExecApplied = self.post_json(url, envelope).await?;
        Ok(applied.exec_id)
    }

    /// Look up a running execution.
    ///
    /// `GET /exec/current/{execId}`
    pub async fn current_execution(&self, exec_id: &str) -> Result<CurrentExecution, Error> {
        let url = self.endpoint_url(&["exec", "current", exec_id])?;
        debug!(exec_id, "looking up execution");
        self.get(url).await
    }

    /// Cancel a running execution.
    ///
    /// `DELETE /exec/current/setup/{execId}`
    pub async fn cancel_execution(&self, exec_id: &str) -> Result<(), Error> {
        let url = self.endpoint_url(&["exec", "current", "setup", exec_id])?;
        debug!(exec_id, "cancelling execution");
        self.delete(url).await
    }
}
