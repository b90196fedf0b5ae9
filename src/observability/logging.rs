//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable by `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, text format for development
//! - Secrets (tokens, passwords, cookie values) are never logged

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Build the filter: `RUST_LOG` wins, else the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "platform_edge={level},tower_http={level}",
            level = config.log_level
        ))
    })
}

/// Install the global subscriber. Safe to call once per process.
pub fn init_logging(config: &ObservabilityConfig) {
    let json = config.log_format == "json";

    let result = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .try_init();

    if let Err(e) = result {
        eprintln!("logging already initialized: {}", e);
    }
}
