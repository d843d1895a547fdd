//! fshare - command-line front end of the fileshare library

use anyhow::Context;
use clap::Parser;
use fileshare::cli::Cli;
use fileshare::config::{self, ClientConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.debug);

    if let Err(e) = run(cli).await {
        error!("Error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Starting fshare");

    let mut config: ClientConfig = config::load_config_no_validation()
        .await
        .context("failed to load configuration")?;
    cli.apply_overrides(&mut config)
        .context("invalid --connection-string")?;

    // Decoding a token needs no account
    if cli.needs_service() {
        config.validate().context("invalid configuration")?;
    }

    cli.execute(config).await?;

    Ok(())
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "fileshare=debug" } else { "fileshare=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
