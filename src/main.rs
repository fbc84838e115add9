use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logfan::config::load_config;
use logfan::web::run_server;

#[derive(Parser)]
#[command(name = "logfan")]
#[command(about = "Weighted fan-out distributor for log pipelines", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(default_value = "local_config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logfan=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(config_path = %cli.config.display(), "Loading configuration");
    let config = load_config(&cli.config)?;

    info!(
        port = config.port,
        analyzers = config.analyzers.len(),
        total_weight = config.total_weight,
        "Configuration loaded"
    );

    run_server(config).await?;

    Ok(())
}
