use anyhow::Result;
use kube::Client;
use nacos_core::ControllerConfig;
use tracing::{error, info};
use tracing_subscriber::fmt::init as tracing_init;

mod nacos_controller;

use nacos_controller::NacosController;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting nacos-controller...");

    let config = ControllerConfig::from_env();
    info!(?config, "loaded configuration");

    let client = Client::try_default().await?;
    let controller = NacosController::new(client, config)?;

    tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!("Nacos controller error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");

    Ok(())
}
