//! Shared configuration for TaHoma tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `tahoma_core::ConnectionConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tahoma_core::config::{
    DEFAULT_EVENT_PERIOD, DEFAULT_REFRESH_PERIOD, DEFAULT_TIMEOUT, positive_secs_or,
};
use tahoma_core::{ConnectionConfig, TlsVerification};

/// Keyring service name passwords are stored under.
pub const KEYRING_SERVICE: &str = "tahoma";

const ENV_PREFIX: &str = "TAHOMA_";
const ENV_USER: &str = "TAHOMA_USER";
const ENV_PASSWORD: &str = "TAHOMA_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no user configured for profile '{profile}'")]
    NoUser { profile: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: `requested`, else `default_profile`,
    /// else `"default"`.
    pub fn profile_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds between event fetches.
    #[serde(default = "default_event_period")]
    pub event_period: i64,

    /// Seconds between full state refreshes.
    #[serde(default = "default_refresh_period")]
    pub refresh_period: i64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            event_period: default_event_period(),
            refresh_period: default_refresh_period(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}
fn default_event_period() -> i64 {
    secs_i64(DEFAULT_EVENT_PERIOD)
}
fn default_refresh_period() -> i64 {
    secs_i64(DEFAULT_REFRESH_PERIOD)
}

fn secs_i64(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

/// One TaHoma account.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API root; the public cloud endpoint when absent.
    pub base_url: Option<String>,

    /// Account e-mail.
    pub user: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override event period, seconds. Zero or negative means default.
    pub event_period: Option<i64>,

    /// Override refresh period, seconds. Zero or negative means default.
    pub refresh_period: Option<i64>,

    /// Label sent with submitted executions.
    pub execution_label: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification.
    pub insecure: Option<bool>,

    /// Override timeout, seconds.
    pub timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "tahoma", "tahoma").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("tahoma");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` + environment. A missing file yields the
/// defaults. Nested keys come from `TAHOMA_SECTION__KEY` variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    Ok(figment.extract()?)
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Account user: profile value, else `TAHOMA_USER`.
pub fn resolve_user(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    resolve_user_with(profile, profile_name, env_var)
}

/// Account password, first hit wins:
/// 1. the variable named by `password_env`
/// 2. `TAHOMA_PASSWORD`
/// 3. system keyring (`tahoma`, `<profile>/password`)
/// 4. plaintext `password`
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(profile, profile_name, env_var)
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

fn resolve_user_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    profile
        .user
        .clone()
        .or_else(|| env(ENV_USER))
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ConfigError::NoUser {
            profile: profile_name.into(),
        })
}

fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.password_env {
        if let Some(pw) = env(env_name) {
            return Ok(SecretString::from(pw));
        }
    }

    if let Some(pw) = env(ENV_PASSWORD) {
        return Ok(SecretString::from(pw));
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ConnectionConfig` from a profile, with no CLI overrides.
pub fn profile_to_connection_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ConnectionConfig, ConfigError> {
    let user = resolve_user(profile, profile_name)?;
    let password = resolve_password(profile, profile_name)?;
    build_connection_config(profile, defaults, user, password)
}

/// Assemble a `ConnectionConfig` from already-resolved credentials.
pub fn build_connection_config(
    profile: &Profile,
    defaults: &Defaults,
    user: String,
    password: SecretString,
) -> Result<ConnectionConfig, ConfigError> {
    let mut config = ConnectionConfig::new(user, password);

    if let Some(ref raw) = profile.base_url {
        config.base_url = parse_base_url(raw)?;
    }

    config.event_period = positive_secs_or(
        profile.event_period.unwrap_or(defaults.event_period),
        DEFAULT_EVENT_PERIOD,
    );
    config.refresh_period = positive_secs_or(
        profile.refresh_period.unwrap_or(defaults.refresh_period),
        DEFAULT_REFRESH_PERIOD,
    );

    if let Some(ref label) = profile.execution_label {
        config.execution_label.clone_from(label);
    }

    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let timeout = profile.timeout.unwrap_or(defaults.timeout);
    if timeout > 0 {
        config.timeout = Duration::from_secs(timeout);
    }

    Ok(config)
}

/// Parse a base URL, rejecting anything that is not http(s).
pub fn parse_base_url(raw: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: "base_url".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}
