use clap::Parser;
use console::style;
use std::process::exit;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod config;
mod render;
mod shell;

use crate::cli::Cli;
use crate::config::PortalConfig;
use crate::shell::Shell;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shm_portal=info,shm_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{}", style(format!("Error: {:#}", e)).red());
        exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PortalConfig::load(cli.config.as_deref())?;
    tracing::info!("{} portal, backend {}", config.app_name, config.api_url);

    let mut shell = Shell::new(config, cli.init_data.as_deref())?;
    shell.start(cli.landing_url.as_deref()).await;
    shell.flush_notices();

    let result = commands::run(&mut shell, cli.command).await;
    shell.flush_notices();
    result
}
