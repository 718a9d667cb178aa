use std::env;

use anyhow::Result;
use clap::Parser;
use saldo::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "saldo=debug" } else { "saldo=info" };
    let filters = env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filters)
        .init();

    cli.run().await
}
