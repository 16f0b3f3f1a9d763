mod cli;
mod commands;
mod feed;
mod logging;
mod server;

use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let settings = cli.global.resolve()?;

    match cli.command {
        Command::Serve => commands::serve::run(&settings).await,
        Command::BackfillBlocks { delete_first } => {
            commands::backfill::run(&settings, delete_first).await
        }
        Command::HistoricalOutput { interval, output } => {
            commands::history::run(&settings, interval, &output).await
        }
    }
}
