// ── Core error types ──
//
// User-facing errors from tahoma-core. Consumers see the connection-level
// kinds below, never raw reqwest or serde failures. The
// `From<tahoma_api::Error>` impl translates transport-layer errors.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    /// Network failure, timeout or unreadable response. Scheduled ticks
    /// log these and try again on the next tick.
    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── Session ──────────────────────────────────────────────────────
    /// Login explicitly rejected. Never retried automatically.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Still unauthorized after one transparent re-login.
    #[error("Session expired and re-login did not restore it")]
    SessionExpired,

    // ── Remote API ───────────────────────────────────────────────────
    #[error("{message}")]
    RemoteApi {
        status: u16,
        code: Option<String>,
        message: String,
    },

    // ── Executions ───────────────────────────────────────────────────
    /// An execution id could not be mapped back to a device.
    #[error("Cannot resolve execution {exec_id}: {reason}")]
    Resolution { exec_id: String, reason: String },

    /// The execution was swept or the connection closed before a terminal
    /// state arrived.
    #[error("Execution {exec_id} abandoned before reaching a terminal state")]
    ExecutionAbandoned { exec_id: String },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device not initialized")]
    DeviceNotInitialized,

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Lifecycle / configuration ────────────────────────────────────
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Whether the next scheduled attempt may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tahoma_api::Error> for CoreError {
    fn from(err: tahoma_api::Error) -> Self {
        match err {
            tahoma_api::Error::Authentication { message } => CoreError::Authentication { message },
            tahoma_api::Error::SessionExpired => CoreError::SessionExpired,
            tahoma_api::Error::Transport(e) => CoreError::Transport {
                message: e.to_string(),
            },
            tahoma_api::Error::Deserialization { message, .. } => CoreError::Transport {
                message: format!("unexpected response body: {message}"),
            },
            tahoma_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            tahoma_api::Error::Tls(message) => CoreError::Config {
                message: format!("TLS error: {message}"),
            },
            api @ tahoma_api::Error::Api { .. } => {
                let message = api.to_string();
                let code = api.api_error_code().map(str::to_owned);
                CoreError::RemoteApi {
                    status: api.status().unwrap_or_default(),
                    code,
                    message,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_keeps_status_and_code() {
        let err: CoreError = tahoma_api::Error::Api {
            status: 400,
            message: Some("Invalid command".into()),
            code: Some("EXEC_ERROR".into()),
        }
        .into();
        match err {
            CoreError::RemoteApi {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("EXEC_ERROR"));
                assert_eq!(message, "Error 400 Invalid command (EXEC_ERROR)");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn session_and_auth_map_directly() {
        assert!(matches!(
            CoreError::from(tahoma_api::Error::SessionExpired),
            CoreError::SessionExpired
        ));
        assert!(matches!(
            CoreError::from(tahoma_api::Error::Authentication {
                message: "nope".into()
            }),
            CoreError::Authentication { .. }
        ));
    }

    #[test]
    fn bad_body_counts_as_transport() {
        let err = CoreError::from(tahoma_api::Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        });
        assert!(err.is_transient());
    }
}
