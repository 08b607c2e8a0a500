use thiserror::Error;

/// Top-level error type for the `tahoma-api` crate.
///
/// Covers every failure mode of the end-user API: authentication,
/// transport, and non-2xx responses carrying the server's error payload.
/// `tahoma-core` maps these into the connection-level error kinds.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected by the server (bad credentials, locked account, ...).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Session cookie is missing, expired or revoked (HTTP 401).
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing or construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Remote API ──────────────────────────────────────────────────
    /// Non-2xx response. `message` / `code` come from the
    /// `{ "error": ..., "errorCode": ... }` body when the server sends one.
    #[error("{}", format_api_error(*status, message.as_deref(), code.as_deref()))]
    Api {
        status: u16,
        message: Option<String>,
        code: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

fn format_api_error(status: u16, message: Option<&str>, code: Option<&str>) -> String {
    let mut msg = format!("Error {status}");
    if let Some(message) = message {
        msg.push(' ');
        msg.push_str(message);
    }
    if let Some(code) = code {
        msg.push_str(&format!(" ({code})"));
    }
    msg
}

impl Error {
    /// Returns `true` if the session is no longer valid and a fresh
    /// login might resolve it.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Returns `true` for network-level failures that the next scheduled
    /// attempt may not hit again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// HTTP status of a non-2xx response, if that is what this error is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::SessionExpired => Some(401),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-supplied `errorCode`, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_message_includes_status_message_and_code() {
        let err = Error::Api {
            status: 400,
            message: Some("Invalid listener".into()),
            code: Some("UNSPECIFIED_ERROR".into()),
        };
        assert_eq!(err.to_string(), "Error 400 Invalid listener (UNSPECIFIED_ERROR)");
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.api_error_code(), Some("UNSPECIFIED_ERROR"));
    }

    #[test]
    fn api_error_message_without_payload() {
        let err = Error::Api {
            status: 503,
            message: None,
            code: None,
        };
        assert_eq!(err.to_string(), "Error 503");
    }

    #[test]
    fn session_expired_is_flagged() {
        assert!(Error::SessionExpired.is_session_expired());
        assert!(!Error::Tls("x".into()).is_session_expired());
    }
}
