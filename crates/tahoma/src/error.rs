//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use tahoma_config::ConfigError;
use tahoma_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const EXECUTION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the TaHoma server: {reason}")]
    #[diagnostic(
        code(tahoma::connection_failed),
        help(
            "Check your network connection and the configured base_url.\n\
             Behind an intercepting proxy, try --insecure."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(tahoma::auth_failed),
        help(
            "Verify the account e-mail and password.\n\
             Run: tahoma config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("Session expired and could not be renewed")]
    #[diagnostic(
        code(tahoma::session_expired),
        help("The server kept rejecting the session after a fresh login. Try again later.")
    )]
    SessionExpired,

    #[error("No user configured for profile '{profile}'")]
    #[diagnostic(
        code(tahoma::no_user),
        help("Pass --user, set TAHOMA_USER, or add `user` to the profile.")
    )]
    NoUser { profile: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(tahoma::no_credentials),
        help(
            "Store one with: tahoma config set-password --profile {profile}\n\
             Or set the TAHOMA_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(tahoma::not_found),
        help("Run: tahoma {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error (HTTP {status}{}): {message}", .code.as_deref().map(|c| format!(", {c}")).unwrap_or_default())]
    #[diagnostic(code(tahoma::api_error))]
    ApiError {
        status: u16,
        code: Option<String>,
        message: String,
    },

    // ── Executions ───────────────────────────────────────────────────
    #[error("Execution {exec_id} ended in state {state}{}", .failure.as_deref().map(|f| format!(" ({f})")).unwrap_or_default())]
    #[diagnostic(code(tahoma::execution_failed))]
    ExecutionFailed {
        exec_id: String,
        state: String,
        failure: Option<String>,
    },

    #[error("Execution {exec_id} was abandoned before finishing")]
    #[diagnostic(
        code(tahoma::execution_abandoned),
        help("No terminal event arrived in time. Check the device with: tahoma watch")
    )]
    ExecutionAbandoned { exec_id: String },

    #[error("Gave up waiting after {seconds}s")]
    #[diagnostic(
        code(tahoma::timeout),
        help("Raise --wait, or follow progress with: tahoma watch")
    )]
    Timeout { seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tahoma::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(tahoma::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No account configured")]
    #[diagnostic(
        code(tahoma::no_config),
        help(
            "Pass --user and set TAHOMA_PASSWORD, or create a profile.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(tahoma::config))]
    Config { message: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    #[diagnostic(code(tahoma::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    #[diagnostic(code(tahoma::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. }
            | Self::SessionExpired
            | Self::NoUser { .. }
            | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::ExecutionFailed { .. } | Self::ExecutionAbandoned { .. } => exit_code::EXECUTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport { message } => CliError::ConnectionFailed { reason: message },

            CoreError::Authentication { message } => CliError::AuthFailed {
                profile: "default".into(),
                message,
            },

            CoreError::SessionExpired => CliError::SessionExpired,

            CoreError::RemoteApi {
                status,
                code,
                message,
            } => CliError::ApiError {
                status,
                code,
                message,
            },

            CoreError::Resolution { exec_id, reason } => CliError::NotFound {
                resource_type: "execution".into(),
                identifier: format!("{exec_id} ({reason})"),
                list_command: "watch".into(),
            },

            CoreError::ExecutionAbandoned { exec_id } => CliError::ExecutionAbandoned { exec_id },

            CoreError::DeviceNotInitialized => CliError::Validation {
                field: "device".into(),
                reason: "device has no URL yet".into(),
            },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "devices".into(),
            },

            CoreError::ConnectionClosed => CliError::ConnectionFailed {
                reason: "connection closed".into(),
            },

            CoreError::Config { message } => CliError::Config { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::NoUser { profile } => CliError::NoUser { profile },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
