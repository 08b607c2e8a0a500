// ── Runtime connection configuration ──
//
// These types describe *how* to reach the TaHoma cloud and how often to
// poll it. They carry credential data and tuning, but never touch disk.
// The CLI constructs a `ConnectionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use tahoma_api::TlsMode;

/// Default end-user API root.
pub const DEFAULT_BASE_URL: &str = "https://tahomalink.com/enduser-mobile-web/enduserAPI";

/// Default label attached to submitted executions.
pub const DEFAULT_EXECUTION_LABEL: &str = "tahoma command";

pub const DEFAULT_EVENT_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(600);
pub const DEFAULT_REFRESH_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_EXECUTION_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict). The cloud endpoint has a public certificate.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (intercepting proxies, local test servers).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Configuration for one account connection.
///
/// Built by the CLI, passed to `Connection`; core never reads config files.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// API root (e.g. [`DEFAULT_BASE_URL`]).
    pub base_url: Url,
    pub user: String,
    pub password: SecretString,
    /// Pause between two event fetches.
    pub event_period: Duration,
    /// Pause between two full state refreshes.
    pub refresh_period: Duration,
    /// Wait between the refresh trigger and the device list read.
    pub refresh_settle_delay: Duration,
    /// How often stale executions are evicted.
    pub sweep_period: Duration,
    /// Age after which an execution without a terminal event is dropped.
    pub execution_ttl: Duration,
    /// Label sent with every execution envelope.
    pub execution_label: String,
    /// HTTP request timeout; must exceed the server's long-poll hold time.
    pub timeout: Duration,
    pub tls: TlsVerification,
}

impl ConnectionConfig {
    /// Config for `user` against the default endpoint with default periods.
    pub fn new(user: impl Into<String>, password: SecretString) -> Self {
        Self {
            base_url: default_base_url(),
            user: user.into(),
            password,
            event_period: DEFAULT_EVENT_PERIOD,
            refresh_period: DEFAULT_REFRESH_PERIOD,
            refresh_settle_delay: DEFAULT_REFRESH_SETTLE_DELAY,
            sweep_period: DEFAULT_SWEEP_PERIOD,
            execution_ttl: DEFAULT_EXECUTION_TTL,
            execution_label: DEFAULT_EXECUTION_LABEL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            tls: TlsVerification::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the event period in whole seconds; zero or negative keeps the default.
    pub fn with_event_period_secs(mut self, secs: i64) -> Self {
        self.event_period = positive_secs_or(secs, DEFAULT_EVENT_PERIOD);
        self
    }

    /// Set the refresh period in whole seconds; zero or negative keeps the default.
    pub fn with_refresh_period_secs(mut self, secs: i64) -> Self {
        self.refresh_period = positive_secs_or(secs, DEFAULT_REFRESH_PERIOD);
        self
    }
}

/// `secs` as a duration if it is strictly positive, `default` otherwise.
pub fn positive_secs_or(secs: i64, default: Duration) -> Duration {
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map_or(default, Duration::from_secs)
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!("DEFAULT_BASE_URL is valid"))
}
