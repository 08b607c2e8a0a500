//! `devices`: refresh once and list what the account can see.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use tahoma_core::{Connection, Device};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Type")]
    controllable_name: String,
}

#[derive(Tabled)]
struct DeviceStatesRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "States")]
    states: String,
}

#[derive(Serialize)]
struct DeviceListing {
    label: String,
    url: String,
    controllable_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    states: Option<BTreeMap<String, Value>>,
}

impl DeviceListing {
    fn new(device: &Arc<Device>, with_states: bool) -> Self {
        Self {
            label: device.label.clone(),
            url: device.url.clone(),
            controllable_name: device.controllable_name.clone(),
            states: with_states.then(|| {
                device
                    .states
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            }),
        }
    }
}

fn states_text(states: Option<&BTreeMap<String, Value>>) -> String {
    states
        .into_iter()
        .flatten()
        .map(|(name, value)| format!("{name}={}", output::value_text(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn handle(
    connection: &Connection,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    connection.refresh().await?;

    let needle = args.filter.as_deref().map(str::to_lowercase);
    let listings: Vec<DeviceListing> = connection
        .devices_snapshot()
        .iter()
        .filter(|d| {
            needle
                .as_deref()
                .is_none_or(|n| d.label.to_lowercase().contains(n))
        })
        .map(|d| DeviceListing::new(d, args.states))
        .collect();

    let rendered = if args.states {
        output::render_list(
            &global.output,
            &listings,
            |d| DeviceStatesRow {
                label: d.label.clone(),
                url: d.url.clone(),
                states: states_text(d.states.as_ref()),
            },
            |d| d.url.clone(),
        )?
    } else {
        output::render_list(
            &global.output,
            &listings,
            |d| DeviceRow {
                label: d.label.clone(),
                url: d.url.clone(),
                controllable_name: d.controllable_name.clone().unwrap_or_default(),
            },
            |d| d.url.clone(),
        )?
    };

    output::print_output(&rendered, global.quiet);
    Ok(())
}
