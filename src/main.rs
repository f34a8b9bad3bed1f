//! Thermoflock binary entry point.

use clap::Parser;

use thermoflock::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::run(cli).await
}
