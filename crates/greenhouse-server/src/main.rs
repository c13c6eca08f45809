//! Greenhouse binary
//!
//! Runs the greenhouse simulator and serves control panels until Ctrl-C.

use std::sync::Arc;

use greenhouse_server::{GreenhouseServer, Layout, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greenhouse=info,greenhouse_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting greenhouse simulator");

    let config = ServerConfig::from_env()?;
    let layout = Layout::load_or_builtin(config.layout_path.as_deref())?;
    tracing::info!(
        "Greenhouse initialized with {} nodes (actuator policy: {})",
        layout.nodes.len(),
        config.actuator_policy
    );

    let registry = Arc::new(layout.into_registry(config.actuator_policy));
    let server = GreenhouseServer::bind(config, registry).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                handle.shutdown();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    Ok(())
}
