//! stat7d - STAT7 content-addressable entity store daemon
//!
//! This daemon wires the admission firewall (collapse gate -> recovery
//! gate / conservator) and the retrieval engine behind an HTTP surface,
//! backed by an embedded `sled` store.

use clap::Parser;
use stat7d::config::Config;
use stat7d::server::Server;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let filter = EnvFilter::from_default_env().add_directive(
        if config.verbose { "stat7d=debug" } else { "stat7d=info" }
            .parse()
            .unwrap(),
    );

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!(
        "stat7d v{} - STAT7 admission and retrieval daemon",
        env!("CARGO_PKG_VERSION")
    );

    match Server::new(config).map(Arc::new) {
        Ok(server) => {
            let ctrlc_server = server.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("received shutdown signal");
                ctrlc_server.shutdown();
            });

            if let Err(e) = server.run().await {
                error!(error = %e, "server error");
                return ExitCode::FAILURE;
            }
        }
        Err(e) => {
            error!(error = %e, "failed to initialize server");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
