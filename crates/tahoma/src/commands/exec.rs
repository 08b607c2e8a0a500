//! `exec`: submit one command, optionally waiting for its outcome.

use serde::Serialize;
use serde_json::Value;

use tahoma_core::{CommandRecord, Connection, CoreError, ExecutionState};

use crate::cli::{ExecArgs, GlobalOpts, TargetArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ExecReport {
    exec_id: String,
    device_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<ExecutionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_type: Option<String>,
}

fn detail(r: &ExecReport) -> String {
    let mut lines = vec![
        format!("Execution: {}", r.exec_id),
        format!("Device:    {}", r.device_url),
    ];
    if let Some(ref state) = r.state {
        lines.push(format!("State:     {state}"));
    }
    if let Some(ref failure) = r.failure_type {
        lines.push(format!("Failure:   {failure}"));
    }
    lines.join("\n")
}

/// A parameter given on the command line: JSON literal if it parses,
/// plain string otherwise.
fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

async fn resolve_target(connection: &Connection, target: &TargetArgs) -> Result<String, CliError> {
    if let Some(ref url) = target.url {
        return Ok(url.clone());
    }
    let Some(ref label) = target.label else {
        return Err(CliError::Validation {
            field: "target".into(),
            reason: "one of --url or --label is required".into(),
        });
    };

    connection.refresh().await?;
    connection
        .device_by_label(label)
        .map(|d| d.url.clone())
        .ok_or_else(|| {
            CoreError::DeviceNotFound {
                identifier: label.clone(),
            }
            .into()
        })
}

pub async fn handle(
    connection: &Connection,
    args: ExecArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let device_url = resolve_target(connection, &args.target).await?;
    let params: Vec<Value> = args.params.iter().map(String::as_str).map(parse_param).collect();

    if args.wait.is_some() {
        connection.start().await?;
    }

    let handle = connection
        .execute_command(&device_url, CommandRecord::action(args.command.as_str(), params))
        .await?;
    let mut report = ExecReport {
        exec_id: handle.exec_id().to_owned(),
        device_url: handle.device_url().to_owned(),
        state: None,
        failure_type: None,
    };

    let mut failure = None;
    if let Some(limit) = args.wait {
        let exec_id = report.exec_id.clone();
        let outcome = tokio::time::timeout(limit, handle.wait())
            .await
            .map_err(|_| CliError::Timeout {
                seconds: limit.as_secs(),
            })??;

        if !outcome.succeeded() {
            failure = Some(CliError::ExecutionFailed {
                exec_id,
                state: outcome.state.to_string(),
                failure: outcome.failure_type.clone(),
            });
        }
        report.state = Some(outcome.state);
        report.failure_type = outcome.failure_type;
    }

    let rendered = output::render_single(&global.output, &report, detail, |r| r.exec_id.clone())?;
    output::print_output(&rendered, global.quiet);

    failure.map_or(Ok(()), Err)
}
