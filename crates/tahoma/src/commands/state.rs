//! `state`: read one state of one device.

use serde::Serialize;
use serde_json::Value;

use tahoma_core::Connection;

use crate::cli::{GlobalOpts, StateArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct StateReport {
    device_url: String,
    name: String,
    value: Value,
}

pub async fn handle(
    connection: &Connection,
    args: StateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let value = connection.request_state(&args.url, &args.name).await?;
    let report = StateReport {
        device_url: args.url,
        name: args.name,
        value,
    };

    let rendered = output::render_single(
        &global.output,
        &report,
        |r| format!("{} = {}", r.name, output::value_text(&r.value)),
        |r| output::value_text(&r.value),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
