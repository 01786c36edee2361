//! SiteScout CLI: domain-restricted crawling and answer-stream replay.
//!
//! Crawls a bounded set of sites into a structured report, probes sites for
//! `llms.txt` manifests, and replays recorded reasoning event streams as
//! client records.

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
