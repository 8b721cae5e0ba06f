mod args;
mod cli;
mod spinner;

use anyhow::Result;
use clap::Parser;

use crate::args::Args;
use crate::cli::Cli;

fn main() -> Result<()> {
    // Credentials usually live in a `.env` file next to the data.
    dotenv::dotenv().ok();

    let cli = Cli::new(Args::parse());
    cli.setup();

    // Create the tokio runtime and execute the cli
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to initialize runtime")
        .block_on(cli.exec())
}
