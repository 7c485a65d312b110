mod completion;
mod config;
mod error;
mod http;
mod relay;

use crate::completion::CompletionClient;
use crate::config::AppConfig;
use crate::http::HttpState;
use crate::relay::RelayClient;
use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "whatsapp-bot-server")]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = VERSION)]
struct CliArguments {
    /// Check required environment variables and exit.
    #[arg(long)]
    check: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
    info!("build version: {VERSION}");
}

fn main() -> Result<()> {
    dotenv().ok();

    let args = CliArguments::parse();
    if args.check {
        return config::check_environment();
    }

    init_tracing();
    let config = AppConfig::from_env()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move { serve(config).await })
}

async fn serve(config: AppConfig) -> Result<()> {
    let state = HttpState {
        completion: CompletionClient::new(&config)?,
        relay: RelayClient::new(&config)?,
    };
    let app = http::create_app(state);

    let listener = TcpListener::bind(config.address)
        .await
        .with_context(|| format!("Failed to bind {}", config.address))?;

    info!("Starting HTTP listener @ {}", config.address);
    axum::serve(listener, app).await?;

    Ok(())
}
