mod cli;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use config::DeploymentFile;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    // Commands that do not need a deployment file
    match &cli.command {
        Commands::GenerateKey(args) => return commands::keys::generate_key(args),
        Commands::GenerateSecret => {
            commands::keys::generate_secret();
            return Ok(());
        }
        Commands::HashPassword(args) => return commands::keys::hash(args),
        _ => {}
    }

    let deployment = DeploymentFile::load(&cli.config)?;
    match &cli.command {
        Commands::Issue(args) => commands::token::issue(&deployment, args).await?,
        Commands::Revoke(args) => commands::token::revoke(&deployment, args).await?,
        Commands::Decode(args) => commands::token::decode(&deployment, args)?,
        Commands::Jwks => commands::token::jwks(&deployment)?,
        Commands::Sweep => commands::store::sweep(&deployment).await?,
        Commands::Migrate => commands::store::migrate(&deployment).await?,
        Commands::GenerateKey(_) | Commands::GenerateSecret | Commands::HashPassword(_) => {}
    }

    Ok(())
}
