use crate::cli::{Args, Command};
use crate::logging::setup_logging;
use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use velizy::Portal;
use velizy::config::{BackendKind, Config};
use velizy::portal::is_error_object;
use velizy::session::Session;
use velizy::timetable::Timetable;

mod cli;
mod logging;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if args.relay {
        config.backend = BackendKind::Relay;
    }
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        backend = ?config.backend,
        "starting velizy"
    );

    match run(args.command, &config).await {
        Ok(output) => {
            println!("{output:#}");
            if is_error_object(&output) {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = ?e, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Run one command and return the JSON value to print.
async fn run(command: Command, config: &Config) -> anyhow::Result<Value> {
    match command {
        Command::Login { username, password } => {
            let portal = Portal::from_config(config)?;
            Ok(portal.connection(&username, &password).await)
        }
        Command::Schedule {
            class_id,
            start,
            end,
            grouped: true,
        } => {
            if config.backend == BackendKind::Relay {
                anyhow::bail!("--grouped is only available with the direct backend");
            }
            let session = Arc::new(Session::new(&config.http_settings())?);
            let timetable = Timetable::from_config(config, session)?;
            let schedule = timetable
                .fetch_schedule(
                    &class_id,
                    &start.format(DATE_FORMAT).to_string(),
                    &end.format(DATE_FORMAT).to_string(),
                )
                .await
                .context("Failed to fetch schedule")?;
            Ok(serde_json::to_value(schedule)?)
        }
        Command::Schedule {
            class_id,
            start,
            end,
            grouped: false,
        } => {
            let portal = Portal::from_config(config)?;
            Ok(portal
                .edt(
                    &class_id,
                    &start.format(DATE_FORMAT).to_string(),
                    &end.format(DATE_FORMAT).to_string(),
                )
                .await)
        }
    }
}
