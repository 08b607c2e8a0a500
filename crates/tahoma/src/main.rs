mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tahoma_core::Connection;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // No account needed
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "tahoma", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let connection_config = config::resolve_connection_config(&cli.global)?;
            let connection = Connection::new(connection_config)?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &connection, &cli.global).await;
            connection.close().await;
            result.map_err(|err| with_profile(err, &cli.global))
        }
    }
}

/// Fill the active profile name into errors whose help text mentions it.
fn with_profile(err: CliError, global: &cli::GlobalOpts) -> CliError {
    match err {
        CliError::AuthFailed { message, .. } => CliError::AuthFailed {
            profile: global.profile.clone().unwrap_or_else(|| "default".into()),
            message,
        },
        other => other,
    }
}
