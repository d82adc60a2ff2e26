//! Standalone worker API server.
//!
//! Loads configuration, installs logging (and optionally metrics), then
//! serves the route registry on `127.0.0.1:<port>` until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use worker_api::config::{load_config, ApiConfig};
use worker_api::lifecycle::signals::shutdown_signal;
use worker_api::observability::{logging, metrics};
use worker_api::{ApiServer, RouteEntry};

#[derive(Parser)]
#[command(name = "worker-api")]
#[command(about = "Dynamically extensible HTTP control-plane server", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configuration.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ApiConfig::default(),
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("worker-api v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = Arc::new(ApiServer::from_config(&config.server));
    server
        .registrar()
        .register(vec![RouteEntry::get("/healthz", |_req: axum::extract::Request| async {
            "ok"
        })])?;

    let closer = Arc::clone(&server);
    tokio::spawn(async move {
        shutdown_signal().await;
        closer.close();
    });

    // A fatal server error exits the process from inside the task.
    server.start().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
