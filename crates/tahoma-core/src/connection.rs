// ── Connection ──
//
// Full lifecycle of one account connection: lazy login with transparent
// re-login, the event long-poll and state refresh schedules, execution
// correlation, and the broadcast of everything observed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tahoma_api::{CommandRecord, EventRecord, ExecutionEnvelope, TahomaClient, TransportConfig};

use crate::config::ConnectionConfig;
use crate::error::CoreError;
use crate::event::{ConnectionEvent, ExecStateChange};
use crate::model::{Device, ExecutionOutcome, ExecutionState, StateValue};
use crate::router::{self, Routed};
use crate::session::SessionManager;
use crate::store::DeviceStore;
use crate::tracker::{ExecutionTracker, PendingExecutionInfo, TrackerUpdate};

const EVENT_CHANNEL_SIZE: usize = 256;

// ── ExecutionHandle ──────────────────────────────────────────────────

/// Receipt for a submitted execution.
///
/// The submission itself succeeded; the outcome arrives later through the
/// event stream. [`wait`](Self::wait) resolves once it does.
#[derive(Debug)]
pub struct ExecutionHandle {
    exec_id: String,
    device_url: String,
    outcome: oneshot::Receiver<ExecutionOutcome>,
}

impl ExecutionHandle {
    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    pub fn device_url(&self) -> &str {
        &self.device_url
    }

    /// Wait for the terminal state.
    ///
    /// Fails with [`CoreError::ExecutionAbandoned`] if the execution was
    /// swept as stale or the connection closed first.
    pub async fn wait(self) -> Result<ExecutionOutcome, CoreError> {
        let exec_id = self.exec_id;
        self.outcome
            .await
            .map_err(|_| CoreError::ExecutionAbandoned { exec_id })
    }
}

// ── Connection ───────────────────────────────────────────────────────

struct Listener {
    id: String,
    /// Login generation the registration was made under.
    generation: u64,
}

/// One authenticated connection to the TaHoma cloud.
///
/// Cheaply cloneable via `Arc<ConnectionInner>`. Nothing happens on
/// construction; requests log in lazily and [`start`](Self::start) spawns
/// the background schedules.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    config: ConnectionConfig,
    session: SessionManager,
    listener: Mutex<Option<Listener>>,
    tracker: ExecutionTracker,
    store: DeviceStore,
    events: broadcast::Sender<ConnectionEvent>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Create a connection from configuration. Does not touch the network.
    pub fn new(config: ConnectionConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: (&config.tls).into(),
            timeout: config.timeout,
            cookie_jar: None,
        };
        let client = TahomaClient::new(config.base_url.clone(), &transport)?;
        Ok(Self::with_client(config, client))
    }

    /// Create a connection around an existing client.
    pub fn with_client(config: ConnectionConfig, client: TahomaClient) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let session = SessionManager::new(
            client,
            config.user.clone(),
            config.password.clone(),
            events.clone(),
            cancel.clone(),
        );
        let tracker = ExecutionTracker::new(config.execution_ttl);

        Self {
            inner: Arc::new(ConnectionInner {
                config,
                session,
                listener: Mutex::new(None),
                tracker,
                store: DeviceStore::new(),
                events,
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the background schedules: event polling, state refresh
    /// (first cycle right away), execution sweep and the session watcher.
    ///
    /// Calling it again while running is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.ensure_open()?;

        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            return Ok(());
        }

        let cancel = self.inner.cancel.clone();
        let config = &self.inner.config;

        handles.push(tokio::spawn(session_watch_task(
            self.clone(),
            self.inner.session.watch_logged(),
            cancel.clone(),
        )));
        handles.push(tokio::spawn(event_poll_task(
            self.clone(),
            config.event_period,
            cancel.clone(),
        )));
        handles.push(tokio::spawn(refresh_task(
            self.clone(),
            config.refresh_period,
            cancel.clone(),
        )));
        handles.push(tokio::spawn(sweep_task(
            self.clone(),
            config.sweep_period,
            cancel,
        )));

        info!(
            user = %config.user,
            event_period = ?config.event_period,
            refresh_period = ?config.refresh_period,
            "connection started"
        );
        Ok(())
    }

    /// Stop all schedules and forget pending executions.
    ///
    /// Waiters on outstanding executions observe them as abandoned. Work
    /// still in flight returns without touching state or emitting events.
    pub async fn close(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        self.inner.tracker.clear();
        *self.inner.listener.lock().await = None;
        debug!("connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            Err(CoreError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn child_token(&self) -> CancellationToken {
        self.inner.cancel.child_token()
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to everything this connection emits.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_logged(&self) -> bool {
        self.inner.session.is_logged()
    }

    pub fn watch_logged(&self) -> watch::Receiver<bool> {
        self.inner.session.watch_logged()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.store.snapshot()
    }

    pub fn watch_devices(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.inner.store.subscribe()
    }

    pub fn device(&self, url: &str) -> Option<Arc<Device>> {
        self.inner.store.get(url)
    }

    pub fn device_by_label(&self, label: &str) -> Option<Arc<Device>> {
        self.inner.store.find_by_label(label)
    }

    /// When the device list was last replaced by a refresh.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner.store.last_refresh()
    }

    pub fn is_device_executing(&self, url: &str) -> bool {
        self.inner.tracker.is_device_executing(url)
    }

    pub fn pending_executions(&self) -> Vec<PendingExecutionInfo> {
        self.inner.tracker.snapshot()
    }

    /// Whether an event listener is currently registered.
    pub async fn has_listener(&self) -> bool {
        self.current_listener().await.is_some()
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// One refresh cycle: trigger a state refresh, wait for it to settle,
    /// then replace the device list.
    ///
    /// On failure the previous list stays and nothing is emitted.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.ensure_open()?;
        let session = &self.inner.session;

        session.call(|c| async move { c.refresh_states().await }).await?;

        let settle = self.inner.config.refresh_settle_delay;
        if !settle.is_zero() {
            tokio::select! {
                biased;
                () = self.inner.cancel.cancelled() => return Err(CoreError::ConnectionClosed),
                () = tokio::time::sleep(settle) => {}
            }
        }

        let raw = session.call(|c| async move { c.list_devices().await }).await?;
        self.ensure_open()?;

        let devices = self
            .inner
            .store
            .replace_all(raw.into_iter().map(Device::from).collect());
        info!(count = devices.len(), "devices refreshed");

        self.emit(ConnectionEvent::DevicesRefreshed {
            devices: Arc::clone(&devices),
        });
        for device in devices.iter() {
            let states = device
                .states
                .iter()
                .map(|(name, value)| StateValue {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect();
            self.emit(ConnectionEvent::DeviceStateChanged {
                device_url: device.url.clone(),
                states,
            });
        }
        Ok(())
    }

    // ── Event polling ────────────────────────────────────────────────

    /// One event poll. Returns the number of records processed.
    ///
    /// Without a listener this is a no-op returning 0 (and registers one
    /// for the next tick if executions are waiting on events). A fetch
    /// failure drops the listener so it gets re-created.
    pub async fn poll_events(&self) -> Result<usize, CoreError> {
        self.ensure_open()?;

        let Some(listener_id) = self.current_listener().await else {
            if !self.inner.tracker.is_empty() {
                self.ensure_listener().await?;
            }
            return Ok(0);
        };

        let id = listener_id.as_str();
        let records = match self
            .inner
            .session
            .call(move |c| async move { c.fetch_events(id).await })
            .await
        {
            Ok(records) => records,
            Err(e) => {
                self.clear_listener(&listener_id).await;
                return Err(e);
            }
        };

        let count = records.len();
        for record in records {
            if self.is_closed() {
                break;
            }
            self.route_event(record).await;
        }
        Ok(count)
    }

    async fn route_event(&self, record: EventRecord) {
        match router::classify(record) {
            Routed::DeviceState { device_url, states } => {
                self.inner.store.apply_states(&device_url, &states);
                self.emit(ConnectionEvent::DeviceStateChanged { device_url, states });
            }
            Routed::Execution {
                exec_id,
                new_state,
                failure_type,
            } => {
                self.route_execution(exec_id, new_state, failure_type).await;
            }
            Routed::Ignored { name } => debug!(event = %name, "ignoring event"),
            Routed::Unknown(record) => {
                debug!(event = %record.name, record = ?record, "unhandled event");
            }
            Routed::Malformed { name, missing } => {
                warn!(event = %name, missing, "dropping malformed event");
            }
        }
    }

    async fn route_execution(
        &self,
        exec_id: String,
        new_state: ExecutionState,
        failure_type: Option<String>,
    ) {
        let device_url = match self.inner.tracker.resolve(&exec_id, &self.inner.session).await {
            Ok(url) => url,
            Err(e) => {
                warn!(exec_id = %exec_id, error = %e, "dropping execution event");
                return;
            }
        };
        if self.is_closed() {
            return;
        }

        debug!(exec_id = %exec_id, device_url = %device_url, state = %new_state, "execution state changed");
        let update = self
            .inner
            .tracker
            .apply(&exec_id, &new_state, failure_type.as_deref());

        self.emit(ConnectionEvent::ExecStateChanged {
            device_url,
            change: ExecStateChange {
                exec_id,
                new_state,
                failure_type,
            },
        });

        if let TrackerUpdate::Finished { remaining: 0 } = update {
            self.release_listener_if_idle().await;
        }
    }

    // ── Listener registration ────────────────────────────────────────

    /// Listener id, if one is registered for the current session.
    async fn current_listener(&self) -> Option<String> {
        let mut guard = self.inner.listener.lock().await;
        if guard.as_ref().is_some_and(|l| !self.is_current(l)) {
            *guard = None;
        }
        guard.as_ref().map(|l| l.id.clone())
    }

    fn is_current(&self, listener: &Listener) -> bool {
        let session = &self.inner.session;
        session.is_logged() && listener.generation == session.generation()
    }

    /// Register an event listener unless one is active for this session.
    async fn ensure_listener(&self) -> Result<(), CoreError> {
        let mut guard = self.inner.listener.lock().await;
        if guard.as_ref().is_some_and(|l| self.is_current(l)) {
            return Ok(());
        }

        let session = &self.inner.session;
        let id = session
            .call(|c| async move { c.register_listener().await })
            .await?;
        self.ensure_open()?;

        debug!(listener_id = %id, "event listener registered");
        *guard = Some(Listener {
            id,
            generation: session.generation(),
        });
        Ok(())
    }

    /// Forget the listener if it is still `listener_id`.
    async fn clear_listener(&self, listener_id: &str) {
        let mut guard = self.inner.listener.lock().await;
        if guard.as_ref().is_some_and(|l| l.id == listener_id) {
            debug!(listener_id, "dropping event listener");
            *guard = None;
        }
    }

    /// Unregister the listener once no execution is outstanding.
    /// Idempotent: does nothing without a listener.
    async fn release_listener_if_idle(&self) {
        let mut guard = self.inner.listener.lock().await;
        if !self.inner.tracker.is_empty() {
            return;
        }
        let Some(listener) = guard.as_ref() else {
            return;
        };

        let id = listener.id.as_str();
        match self
            .inner
            .session
            .call(move |c| async move { c.unregister_listener(id).await })
            .await
        {
            Ok(()) => {
                debug!(listener_id = %id, "event listener released");
                *guard = None;
            }
            Err(e) => warn!(listener_id = %id, error = %e, "failed to unregister listener"),
        }
    }

    // ── Executions ───────────────────────────────────────────────────

    /// Submit one command to one device.
    ///
    /// Returns as soon as the server accepted the execution; progress is
    /// reported through [`ConnectionEvent::ExecStateChanged`] and the
    /// returned handle. An empty `device_url` fails without any request.
    pub async fn execute_command(
        &self,
        device_url: &str,
        command: CommandRecord,
    ) -> Result<ExecutionHandle, CoreError> {
        self.ensure_open()?;
        if device_url.trim().is_empty() {
            return Err(CoreError::DeviceNotInitialized);
        }

        let command_name = command.name.clone();
        let envelope =
            ExecutionEnvelope::single(&self.inner.config.execution_label, device_url, command);
        let body = &envelope;
        let exec_id = self
            .inner
            .session
            .call(move |c| async move { c.apply_execution(body).await })
            .await?;
        self.ensure_open()?;

        let (tx, rx) = oneshot::channel();
        self.inner
            .tracker
            .record_submission(exec_id.clone(), device_url.to_owned(), Some(tx));
        info!(exec_id = %exec_id, device_url, command = %command_name, "execution submitted");

        if let Err(e) = self.ensure_listener().await {
            warn!(exec_id = %exec_id, error = %e, "listener registration failed, retrying on next poll");
        }

        Ok(ExecutionHandle {
            exec_id,
            device_url: device_url.to_owned(),
            outcome: rx,
        })
    }

    /// Cancel a running execution on the server.
    pub async fn cancel_execution(&self, exec_id: &str) -> Result<(), CoreError> {
        self.ensure_open()?;
        self.inner
            .session
            .call(move |c| async move { c.cancel_execution(exec_id).await })
            .await?;
        info!(exec_id, "execution cancel requested");
        Ok(())
    }

    /// Read one state of one device straight from the server.
    pub async fn request_state(&self, device_url: &str, state_name: &str) -> Result<Value, CoreError> {
        self.ensure_open()?;
        if device_url.trim().is_empty() {
            return Err(CoreError::DeviceNotInitialized);
        }
        self.inner
            .session
            .call(move |c| async move { c.get_state(device_url, state_name).await })
            .await
    }

    /// Evict executions past their time-to-live. Returns how many went.
    pub async fn sweep_executions(&self) -> usize {
        let removed = self.inner.tracker.sweep();
        if removed > 0 {
            debug!(removed, remaining = self.inner.tracker.len(), "swept stale executions");
            if self.inner.tracker.is_empty() && !self.is_closed() {
                self.release_listener_if_idle().await;
            }
        }
        removed
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn emit(&self, event: ConnectionEvent) {
        if self.is_closed() {
            return;
        }
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Re-register the listener on login, drop it when the session ends.
async fn session_watch_task(
    connection: Connection,
    mut logged: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = logged.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_logged = *logged.borrow_and_update();
                if now_logged {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        result = connection.ensure_listener() => {
                            if let Err(e) = result {
                                warn!(error = %e, "listener registration after login failed");
                            }
                        }
                    }
                } else {
                    // Drops the id if it belongs to the expired session.
                    let _ = connection.current_listener().await;
                }
            }
        }
    }
}

/// Long-poll loop. The next fetch is scheduled `period` after the
/// previous one finished, so fetches never overlap.
async fn event_poll_task(connection: Connection, period: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => {}
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connection.poll_events() => {
                match result {
                    Ok(0) => {}
                    Ok(count) => debug!(count, "processed events"),
                    Err(e) => warn!(error = %e, "event poll failed"),
                }
            }
        }
    }
}

/// Periodic refresh; the first cycle runs immediately.
async fn refresh_task(connection: Connection, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = connection.refresh() => {
                        if let Err(e) = result {
                            warn!(error = %e, "periodic refresh failed");
                        }
                    }
                }
            }
        }
    }
}

async fn sweep_task(connection: Connection, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                connection.sweep_executions().await;
            }
        }
    }
}
