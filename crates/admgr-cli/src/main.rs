//! # admgr
//!
//! Command line front end for Active Directory user, group and organizational unit management.
//!
//! Exits with status 0 on success and 1 when the operation fails.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use admgr_core::ConfigSources;
use admgr_directory::DirectoryClient;
use clap::Parser;
use std::io;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;

use cli::Cli;

fn main() -> ExitCode {
    let mut cli = Cli::parse();
    init_tracing(cli.log_level());

    let json = cli.json;
    let sources = ConfigSources::new(cli.overrides());
    debug!(files = ?sources.files().collect::<Vec<_>>(), "configuration sources");
    let mut client = DirectoryClient::new(sources);

    match commands::execute(&mut client, cli.command) {
        Ok(report) => match output::write_report(&mut io::stdout().lock(), &report, json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: couldn't write output: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            let written = if json {
                output::write_error(&mut io::stdout().lock(), &err, true)
            } else {
                output::write_error(&mut io::stderr().lock(), &err, false)
            };
            if let Err(write_err) = written {
                eprintln!("error: {err:#} ({write_err})");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
