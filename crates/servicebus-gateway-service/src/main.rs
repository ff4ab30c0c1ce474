//! # Service Bus Gateway Service
//!
//! Binary entry point for the gateway HTTP service.
//!
//! This executable:
//! - Loads configuration from files, environment and the command line
//! - Initializes logging
//! - Connects the broker gateway to the configured queue
//! - Starts the HTTP server from servicebus-gateway-api
//!
//! Configuration problems are fatal: the process logs them and exits with
//! status 3 before binding a socket.

use clap::Parser;
use servicebus_gateway_api::{init_tracing, load_config, start_server, ServiceError};
use servicebus_gateway_core::BrokerGateway;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Exit status for configuration that cannot be loaded or is invalid
const CONFIG_EXIT_CODE: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "servicebus-gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP gateway for publishing, receiving and peeking Service Bus messages")]
struct Cli {
    /// Configuration file path; overrides SBG_CONFIG_FILE
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on; overrides server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load before initializing logging so the configured level applies,
    // report any failure once logging is up
    let loaded = load_config(cli.config.as_deref());
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    info!("Starting Service Bus Gateway");

    let mut service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(CONFIG_EXIT_CODE);
        }
    };

    if let Some(port) = cli.port {
        service_config.server.port = port;
    }

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(CONFIG_EXIT_CODE);
    }

    let queue_config = match service_config.service_bus.queue_config() {
        Ok(queue_config) => queue_config,
        Err(e) => {
            error!(error = %e, "Service bus configuration is invalid; aborting");
            std::process::exit(CONFIG_EXIT_CODE);
        }
    };

    let gateway = match BrokerGateway::connect(&queue_config).await {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            let e = ServiceError::from(e);
            error!(error = %e, "Failed to connect to the broker; aborting");
            std::process::exit(e.exit_code());
        }
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        queue = %gateway.queue(),
        "Starting HTTP server"
    );

    if let Err(e) = start_server(service_config, gateway).await {
        error!(error = %e, "Server stopped with an error");
        std::process::exit(e.exit_code());
    }
}
