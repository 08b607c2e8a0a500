//! Command dispatch: bridges CLI args -> Connection calls -> output formatting.

pub mod cancel;
pub mod config_cmd;
pub mod devices;
pub mod exec;
pub mod state;
pub mod watch;

use tahoma_core::Connection;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an account-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    connection: &Connection,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(connection, args, global).await,
        Command::Exec(args) => exec::handle(connection, args, global).await,
        Command::State(args) => state::handle(connection, args, global).await,
        Command::Cancel(args) => cancel::handle(connection, args, global).await,
        Command::Watch(args) => watch::handle(connection, args, global).await,
        // Handled before a connection is built
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
