//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check the route table is self-consistent (login page is auth-only,
//!   dashboard is protected)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::EdgeConfig;
use crate::routing::{RouteClassification, RouteTable};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if !matches!(config.listener.public_scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::new(
            "listener.public_scheme",
            "must be \"http\" or \"https\"",
        ));
    }

    validate_origin(&config.backend.origin, &mut errors);

    let prefix = &config.backend.path_prefix;
    if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
        errors.push(ValidationError::new(
            "backend.path_prefix",
            "must start with '/' and have no trailing '/'",
        ));
    }
    if config.backend.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("backend.connect_timeout_secs", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.backend.request_timeout_secs == 0 {
        errors.push(ValidationError::new("backend.request_timeout_secs", "must be > 0"));
    } else if config.backend.request_timeout_secs >= config.timeouts.request_secs {
        errors.push(ValidationError::new(
            "backend.request_timeout_secs",
            format!(
                "must be below timeouts.request_secs ({})",
                config.timeouts.request_secs
            ),
        ));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be > 0"));
    }
    if config.session.access_cookie_name.is_empty() || config.session.locale_cookie_name.is_empty() {
        errors.push(ValidationError::new("session", "cookie names must not be empty"));
    }

    let routes = &config.routes;
    for locale in &routes.locales {
        if locale.is_empty() || locale.chars().any(|c| !(c.is_ascii_lowercase() || c == '-')) {
            errors.push(ValidationError::new(
                "routes.locales",
                format!("'{}' is not a lowercase locale tag", locale),
            ));
        }
    }
    let table = RouteTable::from_config(routes);
    if table.classify(&routes.login_path) != RouteClassification::AuthOnly {
        errors.push(ValidationError::new(
            "routes.login_path",
            "must fall under an auth-only prefix",
        ));
    }
    if table.classify(&routes.dashboard_path) != RouteClassification::Protected {
        errors.push(ValidationError::new(
            "routes.dashboard_path",
            "must fall under a protected prefix",
        ));
    }
    if routes.return_param.is_empty() {
        errors.push(ValidationError::new("routes.return_param", "must not be empty"));
    }

    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "text" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be \"text\" or \"json\"",
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_origin(origin: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(origin) {
        Ok(url) => {
            // The outbound client speaks plain HTTP only.
            if url.scheme() != "http" {
                errors.push(ValidationError::new("backend.origin", "scheme must be http"));
            }
            if url.host_str().is_none() {
                errors.push(ValidationError::new("backend.origin", "missing host"));
            }
            if url.path() != "/" || url.query().is_some() {
                errors.push(ValidationError::new(
                    "backend.origin",
                    "must be a bare origin without path or query",
                ));
            }
        }
        Err(e) => errors.push(ValidationError::new(
            "backend.origin",
            format!("'{}' is not a URL: {}", origin, e),
        )),
    }
}
