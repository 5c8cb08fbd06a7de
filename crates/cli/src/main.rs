// crates/cli/src/main.rs
mod args;
mod commands;
mod render;

use std::process::ExitCode;

use clap::Parser;
use stemsmith_observability::{init_logging, LogConfig};
use tracing::Instrument;

use crate::args::{Cli, Cmd};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        verbosity: cli.verbose,
        json: cli.log_json,
        file_dir: if cli.log_file {
            LogConfig::default_file_dir()
        } else {
            None
        },
    };
    let _log_guard = match init_logging(log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging disabled: {e:#}");
            None
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Cmd::Profiles = cli.cmd {
        return Ok(commands::profiles());
    }

    let client = commands::connect(cli.endpoint.as_deref())?;
    let span = tracing::info_span!(
        "session",
        session_id = %client.orchestrator().session_id(),
        endpoint = %client.endpoint()
    );

    let result = async {
        match cli.cmd {
            Cmd::Submit(args) => commands::submit(&client, args).await,
            Cmd::Status(args) => commands::status(&client, args).await,
            Cmd::Cancel(args) => commands::cancel(&client, args).await,
            Cmd::Download(args) => commands::download(&client, args).await,
            Cmd::Health(args) => commands::health(&client, args).await,
            Cmd::Endpoint(args) => commands::endpoint(&client, args),
            Cmd::Profiles => Ok(commands::profiles()),
        }
    }
    .instrument(span)
    .await;

    client.shutdown();
    result
}
