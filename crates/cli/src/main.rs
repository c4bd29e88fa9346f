//! `tether` command line: registry maintenance against the configured store.

mod commands;

use std::process;

use clap::Parser;
use tether_observability::LogFormat;

use crate::commands::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tether_observability::init_with(LogFormat::Text);

    let Err(error) = commands::run(cli).await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(error = %format!("{error:#}"), "command failed");
    } else {
        eprintln!("Error: {error:#}");
    }
    process::exit(1);
}
