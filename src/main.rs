//! Platform edge server.
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                PLATFORM EDGE                 │
//!                      │                                              │
//!   Browser request    │  ┌─────────┐    ┌──────────┐    ┌─────────┐  │
//!   ───────────────────┼─▶│  http   │───▶│ security │───▶│  proxy  │──┼──▶ Backend API
//!     /api/*           │  │ server  │    │ headers  │    │forwarder│  │
//!                      │  └─────────┘    └──────────┘    └────┬────┘  │
//!   Browser response   │                                      │       │
//!   ◀──────────────────┼──────────── status, text, body, ─────┘       │
//!                      │             each Set-Cookie                  │
//!                      │                                              │
//!                      │  config · observability · lifecycle          │
//!                      └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use platform_edge::config::{load_config, EdgeConfig};
use platform_edge::http::HttpServer;
use platform_edge::lifecycle::{signals, Shutdown};
use platform_edge::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "platform-edge")]
#[command(about = "Edge proxy for the platform API", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EdgeConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("platform-edge v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.origin,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
