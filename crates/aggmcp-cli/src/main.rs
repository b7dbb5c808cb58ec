use anyhow::Result;
use clap::Parser;

mod bootstrap;
mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Some(Commands::Add { name, args }) => commands::add::run(&name, args).await,
        Some(Commands::StoreAuth { name, pairs }) => commands::store_auth::run(&name, pairs),
        Some(Commands::Serve) | None => commands::serve::run().await,
    };

    let exit_code = match outcome {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            2
        }
    };

    std::process::exit(exit_code);
}
