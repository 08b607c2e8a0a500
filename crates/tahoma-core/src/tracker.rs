// ── Execution tracking ──
//
// Maps server-assigned execution ids back to the device they target and
// to the waiter of the submitting caller. Entries leave the map on a
// terminal state event or when the staleness sweep finds them too old.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{ExecutionOutcome, ExecutionState};
use crate::session::SessionManager;

struct PendingExecution {
    device_url: String,
    submitted_at: Instant,
    state: Option<ExecutionState>,
    completion: Option<oneshot::Sender<ExecutionOutcome>>,
}

/// Read-only view of one tracked execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExecutionInfo {
    pub exec_id: String,
    pub device_url: String,
    /// Last state reported by the server, if any arrived yet.
    pub state: Option<ExecutionState>,
    pub age: Duration,
}

/// What applying a state change did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackerUpdate {
    /// Terminal state: entry removed; `remaining` entries are still tracked.
    Finished { remaining: usize },
    /// Non-terminal state recorded.
    Progressed,
    /// No entry for this id.
    Untracked,
}

pub(crate) struct ExecutionTracker {
    entries: DashMap<String, PendingExecution>,
    ttl: Duration,
}

impl ExecutionTracker {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Track a freshly submitted execution.
    pub(crate) fn record_submission(
        &self,
        exec_id: String,
        device_url: String,
        completion: Option<oneshot::Sender<ExecutionOutcome>>,
    ) {
        self.insert_at(exec_id, device_url, completion, Instant::now());
    }

    fn insert_at(
        &self,
        exec_id: String,
        device_url: String,
        completion: Option<oneshot::Sender<ExecutionOutcome>>,
        submitted_at: Instant,
    ) {
        self.entries.insert(
            exec_id,
            PendingExecution {
                device_url,
                submitted_at,
                state: None,
                completion,
            },
        );
    }

    pub(crate) fn cached_device(&self, exec_id: &str) -> Option<String> {
        self.entries.get(exec_id).map(|e| e.device_url.clone())
    }

    /// Remember a remotely resolved mapping. An existing entry wins.
    fn memoize(&self, exec_id: &str, device_url: &str) {
        self.entries
            .entry(exec_id.to_owned())
            .or_insert_with(|| PendingExecution {
                device_url: device_url.to_owned(),
                submitted_at: Instant::now(),
                state: None,
                completion: None,
            });
    }

    /// Map an execution id to its device: local entry first, otherwise
    /// `GET /exec/current/{id}` (first action's device), memoized.
    pub(crate) async fn resolve(
        &self,
        exec_id: &str,
        session: &SessionManager,
    ) -> Result<String, CoreError> {
        if let Some(url) = self.cached_device(exec_id) {
            return Ok(url);
        }

        debug!(exec_id, "execution not tracked locally, asking the server");
        let current = session
            .call(move |c| async move { c.current_execution(exec_id).await })
            .await
            .map_err(|e| CoreError::Resolution {
                exec_id: exec_id.to_owned(),
                reason: e.to_string(),
            })?;

        let Some(device_url) = current.first_device_url() else {
            return Err(CoreError::Resolution {
                exec_id: exec_id.to_owned(),
                reason: "no such execution".into(),
            });
        };

        self.memoize(exec_id, device_url);
        Ok(device_url.to_owned())
    }

    /// Record a state change. Terminal states remove the entry and hand
    /// the outcome to the waiter, if any.
    pub(crate) fn apply(
        &self,
        exec_id: &str,
        state: &ExecutionState,
        failure_type: Option<&str>,
    ) -> TrackerUpdate {
        if state.is_terminal() {
            let Some((_, entry)) = self.entries.remove(exec_id) else {
                return TrackerUpdate::Untracked;
            };
            if let Some(tx) = entry.completion {
                let _ = tx.send(ExecutionOutcome {
                    exec_id: exec_id.to_owned(),
                    state: state.clone(),
                    failure_type: failure_type.map(str::to_owned),
                });
            }
            return TrackerUpdate::Finished {
                remaining: self.entries.len(),
            };
        }

        match self.entries.get_mut(exec_id) {
            Some(mut entry) => {
                entry.state = Some(state.clone());
                TrackerUpdate::Progressed
            }
            None => TrackerUpdate::Untracked,
        }
    }

    /// Drop entries older than the staleness window. Returns how many
    /// were removed; their waiters observe the execution as abandoned.
    pub(crate) fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.submitted_at) <= self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// True once a non-terminal state has been reported for an execution
    /// on `device_url`. Submitted or memoized entries without a state do
    /// not count.
    pub(crate) fn is_device_executing(&self, device_url: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.device_url == device_url && e.state.is_some())
    }

    pub(crate) fn snapshot(&self) -> Vec<PendingExecutionInfo> {
        let now = Instant::now();
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|e| PendingExecutionInfo {
                exec_id: e.key().clone(),
                device_url: e.device_url.clone(),
                state: e.state.clone(),
                age: now.saturating_duration_since(e.submitted_at),
            })
            .collect();
        out.sort_by(|a, b| b.age.cmp(&a.age));
        out
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}
