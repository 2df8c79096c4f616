mod cli;
mod io_utils;
mod logging;

use clap::Parser;
use tracing::error;

use crate::cli::{Cli, GetVerbosity};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::setup_logger(cli.cmd.get_verbosity(), cli.ansi());

    if let Err(e) = cli.cmd.run().await {
        error!("{e}");
        std::process::exit(1);
    }
}
