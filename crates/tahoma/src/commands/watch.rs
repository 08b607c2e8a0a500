//! `watch`: run the connection and print every event until interrupted.

use owo_colors::OwoColorize;
use tokio::sync::broadcast;
use tracing::warn;

use tahoma_core::{Connection, ConnectionEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    connection: &Connection,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let mut events = connection.subscribe();
    connection.start().await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let deadline = async {
        match args.duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            () = &mut deadline => break,
            received = events.recv() => match received {
                Ok(event) => {
                    if !concerns(&event, args.url.as_deref()) {
                        continue;
                    }
                    let line = render_event(&event, &global.output, color)?;
                    output::print_output(&line, global.quiet);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

/// Whether `event` passes the `--url` filter. Session and refresh events
/// always do.
fn concerns(event: &ConnectionEvent, url: Option<&str>) -> bool {
    let Some(url) = url else {
        return true;
    };
    match event {
        ConnectionEvent::DeviceStateChanged { device_url, .. }
        | ConnectionEvent::ExecStateChanged { device_url, .. } => device_url == url,
        ConnectionEvent::LoggedChanged { .. } | ConnectionEvent::DevicesRefreshed { .. } => true,
    }
}

fn render_event(
    event: &ConnectionEvent,
    format: &OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => Ok(serde_json::to_string(event)?),
        OutputFormat::Yaml => Ok(format!("---\n{}", serde_yaml::to_string(event)?)),
        OutputFormat::Table => Ok(event_line(event, color)),
        OutputFormat::Plain => Ok(event_line(event, false)),
    }
}

fn event_line(event: &ConnectionEvent, color: bool) -> String {
    let time = chrono::Local::now().format("%H:%M:%S").to_string();
    let (kind, body) = match event {
        ConnectionEvent::LoggedChanged { logged } => (
            "session",
            if *logged { "logged in" } else { "logged out" }.to_owned(),
        ),
        ConnectionEvent::DevicesRefreshed { devices } => {
            ("devices", format!("{} devices refreshed", devices.len()))
        }
        ConnectionEvent::DeviceStateChanged { device_url, states } => {
            let states = states
                .iter()
                .map(|s| format!("{}={}", s.name, output::value_text(&s.value)))
                .collect::<Vec<_>>()
                .join(" ");
            ("state", format!("{device_url}  {states}"))
        }
        ConnectionEvent::ExecStateChanged { device_url, change } => {
            let mut body = format!("{device_url}  {} {}", change.exec_id, change.new_state);
            if let Some(ref failure) = change.failure_type {
                body.push_str(&format!(" ({failure})"));
            }
            ("exec", body)
        }
    };

    if color {
        format!("{}  {:<8}  {body}", time.dimmed(), kind.cyan())
    } else {
        format!("{time}  {kind:<8}  {body}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tahoma_core::{ExecStateChange, ExecutionState, StateValue};

    use super::*;

    fn exec_event(url: &str) -> ConnectionEvent {
        ConnectionEvent::ExecStateChanged {
            device_url: url.into(),
            change: ExecStateChange {
                exec_id: "E1".into(),
                new_state: ExecutionState::Failed,
                failure_type: Some("CMDCANCELLED".into()),
            },
        }
    }

    #[test]
    fn url_filter_keeps_session_events() {
        let logged = ConnectionEvent::LoggedChanged { logged: true };
        assert!(concerns(&logged, Some("io://a/1")));
        assert!(concerns(&exec_event("io://a/1"), Some("io://a/1")));
        assert!(!concerns(&exec_event("io://a/2"), Some("io://a/1")));
        assert!(concerns(&exec_event("io://a/2"), None));
    }

    #[test]
    fn plain_lines_carry_state_and_failure() {
        let line = event_line(&exec_event("io://a/1"), false);
        assert!(line.ends_with("exec      io://a/1  E1 FAILED (CMDCANCELLED)"), "{line}");

        let state = ConnectionEvent::DeviceStateChanged {
            device_url: "io://a/1".into(),
            states: vec![StateValue {
                name: "core:OpenClosedState".into(),
                value: json!("open"),
            }],
        };
        assert!(event_line(&state, false).ends_with("io://a/1  core:OpenClosedState=open"));
    }

    #[test]
    fn json_lines_are_tagged() {
        let line = render_event(
            &ConnectionEvent::LoggedChanged { logged: false },
            &OutputFormat::Json,
            false,
        )
        .unwrap();
        assert_eq!(line, r#"{"type":"logged_changed","logged":false}"#);
    }
}
