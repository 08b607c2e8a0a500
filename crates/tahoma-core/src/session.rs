// ── Session management ──
//
// Owns the login state of one account. Every authenticated request goes
// through `SessionManager::call`, which logs in lazily and retries exactly
// once after a 401.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use secrecy::SecretString;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tahoma_api::TahomaClient;

use crate::error::CoreError;
use crate::event::ConnectionEvent;

pub(crate) struct SessionManager {
    client: TahomaClient,
    user: String,
    password: SecretString,
    logged: watch::Sender<bool>,
    /// Bumped on every successful login. Lets a caller that saw a 401 tell
    /// whether someone else already re-authenticated in the meantime.
    generation: AtomicU64,
    login_lock: Mutex<()>,
    events: broadcast::Sender<ConnectionEvent>,
    /// The owning connection's token; once cancelled, no more events.
    closed: CancellationToken,
}

impl SessionManager {
    pub(crate) fn new(
        client: TahomaClient,
        user: String,
        password: SecretString,
        events: broadcast::Sender<ConnectionEvent>,
        closed: CancellationToken,
    ) -> Self {
        let (logged, _) = watch::channel(false);
        Self {
            client,
            user,
            password,
            logged,
            generation: AtomicU64::new(0),
            login_lock: Mutex::new(()),
            events,
            closed,
        }
    }

    pub(crate) fn is_logged(&self) -> bool {
        *self.logged.borrow()
    }

    pub(crate) fn watch_logged(&self) -> watch::Receiver<bool> {
        self.logged.subscribe()
    }

    /// Login generation the current session belongs to.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Run `op` against an authenticated client.
    ///
    /// Logs in first if needed. A 401 marks the session expired, triggers
    /// one re-login and one retry; a second 401 is returned as
    /// [`CoreError::SessionExpired`].
    pub(crate) async fn call<T, F, Fut>(&self, op: F) -> Result<T, CoreError>
    where
        F: Fn(TahomaClient) -> Fut,
        Fut: Future<Output = Result<T, tahoma_api::Error>>,
    {
        let generation = self.ensure_logged_in().await?;

        match op(self.client.clone()).await {
            Err(e) if e.is_session_expired() => {
                warn!(user = %self.user, "session expired, logging in again");
                self.invalidate(generation).await;
                self.ensure_logged_in().await?;
                op(self.client.clone()).await.map_err(CoreError::from)
            }
            other => other.map_err(CoreError::from),
        }
    }

    /// Log in unless a valid session already exists. Returns the login
    /// generation in effect afterwards.
    pub(crate) async fn ensure_logged_in(&self) -> Result<u64, CoreError> {
        if self.is_logged() {
            return Ok(self.generation());
        }

        let _guard = self.login_lock.lock().await;
        if self.is_logged() {
            return Ok(self.generation());
        }

        debug!(user = %self.user, "connecting to server");
        if let Err(e) = self.client.login(&self.user, &self.password).await {
            warn!(user = %self.user, error = %e, "login failed");
            return Err(e.into());
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_logged(true);
        Ok(generation)
    }

    /// Mark the session expired, unless it was already renewed after
    /// `seen_generation`.
    async fn invalidate(&self, seen_generation: u64) {
        let _guard = self.login_lock.lock().await;
        if self.generation() == seen_generation {
            self.set_logged(false);
        }
    }

    fn set_logged(&self, value: bool) {
        let changed = self.logged.send_if_modified(|logged| {
            if *logged == value {
                false
            } else {
                *logged = value;
                true
            }
        });
        if changed {
            info!(user = %self.user, logged = value, "session state changed");
            if !self.closed.is_cancelled() {
                let _ = self.events.send(ConnectionEvent::LoggedChanged { logged: value });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tahoma_api::TransportConfig;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn session_for(
        server: &MockServer,
        closed: CancellationToken,
    ) -> (SessionManager, broadcast::Receiver<ConnectionEvent>) {
        Mock::given(method("POST"))
            .and(path("/enduserAPI/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .mount(server)
            .await;
        let client = TahomaClient::new(
            Url::parse(&format!("{}/enduserAPI", server.uri())).unwrap(),
            &TransportConfig::default(),
        )
        .unwrap();
        let (events, rx) = broadcast::channel(8);
        let session = SessionManager::new(
            client,
            "me@example.com".into(),
            SecretString::from("pw".to_owned()),
            events,
            closed,
        );
        (session, rx)
    }

    #[tokio::test]
    async fn login_announces_session_change() {
        let server = MockServer::start().await;
        let (session, mut rx) = session_for(&server, CancellationToken::new()).await;

        assert_eq!(session.ensure_logged_in().await.unwrap(), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ConnectionEvent::LoggedChanged { logged: true }
        ));
    }

    #[tokio::test]
    async fn login_after_close_stays_silent() {
        let server = MockServer::start().await;
        let closed = CancellationToken::new();
        let (session, mut rx) = session_for(&server, closed.clone()).await;

        closed.cancel();
        session.ensure_logged_in().await.unwrap();

        assert!(session.is_logged());
        assert!(rx.try_recv().is_err());
    }
}
