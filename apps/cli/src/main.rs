//! giftrefresh CLI: monthly content refresh for the gift-ideas site.
//!
//! Refreshes a small batch of existing posts and publishes the month's
//! archive post behind a stable URL.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
