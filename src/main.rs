mod artifact;
mod auth;
mod cli;
mod config;
mod error;
mod output;
mod providers;
mod settings;
mod waiter;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    env_logger::init();

    output::print_banner();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print()?;
            return Ok(ExitCode::from(cli::usage_status(&err)));
        }
    };
    info!("Starting pipewait - GitLab pipeline waiter");
    let outcome = cli.execute().await?;

    Ok(outcome.into())
}
