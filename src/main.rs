use anyhow::Result;
use clap::Parser;
use gcal_manager::cli::Cli;
use gcal_manager::env_manager;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = env_manager::load_env_file() {
        eprintln!("Warning: could not prepare .env file: {}", e);
    }
    let cli = Cli::parse();
    gcal_manager::run(cli).await
}
