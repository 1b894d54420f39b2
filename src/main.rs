use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use rerng_api::{AppConfig, AppServices, ApplicationServer, Logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards have to live as long as main or buffered logs are lost
    let _guards = Logger::init(&config);

    info!("logger and env prepped...");

    let services = AppServices::new(config.clone()).context("failed to build services")?;

    info!(
        "services ok, proxy urls will be written as {}",
        config.proxy_base_url()
    );

    ApplicationServer::serve(config, services)
        .await
        .context("server failed to start")?;

    Ok(())
}
