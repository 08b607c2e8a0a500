//! `cancel`: stop a running execution.

use tahoma_core::Connection;

use crate::cli::{CancelArgs, GlobalOpts};
use crate::error::CliError;

pub async fn handle(
    connection: &Connection,
    args: CancelArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    connection.cancel_execution(&args.exec_id).await?;
    if !global.quiet {
        eprintln!("Cancellation requested for {}", args.exec_id);
    }
    Ok(())
}
