//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge layer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge proxy and session layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address, public scheme).
    pub listener: ListenerConfig,

    /// Backend API origin the proxy relays to.
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Client-side session persistence settings.
    pub session: SessionConfig,

    /// Route protection table.
    pub routes: RouteTableConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Scheme browsers use to reach this listener ("http" or "https").
    /// Used to synthesize the `origin` header sent upstream.
    pub public_scheme: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            public_scheme: "http".to_string(),
        }
    }
}

/// What the forwarder does with a non-empty JSON body that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MalformedJsonPolicy {
    /// Answer 400 `INVALID_JSON_BODY` without contacting the backend.
    #[default]
    Reject,
    /// Forward the request with no body.
    Drop,
}

/// Backend origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend origin (e.g., "http://api.internal:4000").
    pub origin: String,

    /// Path prefix captured by the proxy route and re-applied upstream.
    pub path_prefix: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Deadline for one upstream exchange (send, headers, body) in seconds.
    pub request_timeout_secs: u64,

    /// Handling of malformed JSON request bodies.
    pub malformed_json: MalformedJsonPolicy,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:4000".to_string(),
            path_prefix: "/api".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 25,
            malformed_json: MalformedJsonPolicy::default(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound request deadline in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Client-side session persistence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie mirroring the access token for same-origin calls.
    pub access_cookie_name: String,

    /// Max-Age of the access-token cookie in seconds.
    pub access_cookie_max_age_secs: i64,

    /// Cookie holding the locale preference.
    pub locale_cookie_name: String,

    /// Max-Age of the locale cookie in seconds.
    pub locale_cookie_max_age_secs: i64,

    /// Durable storage key for the refresh token.
    pub refresh_token_key: String,

    /// JSON file backing durable client storage (CLI use).
    pub storage_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_cookie_name: "access_token".to_string(),
            access_cookie_max_age_secs: 604_800,
            locale_cookie_name: "NEXT_LOCALE".to_string(),
            locale_cookie_max_age_secs: 31_536_000,
            refresh_token_key: "refresh_token".to_string(),
            storage_path: ".edge-session.json".to_string(),
        }
    }
}

/// Static route classification table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteTableConfig {
    /// Prefixes only valid for unauthenticated visitors.
    pub auth_only_prefixes: Vec<String>,

    /// Prefixes that require a session.
    pub protected_prefixes: Vec<String>,

    /// Where unauthenticated visitors of protected pages are sent.
    pub login_path: String,

    /// Where authenticated visitors of auth-only pages are sent.
    pub dashboard_path: String,

    /// Query parameter carrying the return target.
    pub return_param: String,

    /// Locale tags accepted as a leading path segment.
    pub locales: Vec<String>,
}

impl Default for RouteTableConfig {
    fn default() -> Self {
        Self {
            auth_only_prefixes: vec!["/auth".to_string()],
            protected_prefixes: vec![
                "/dashboard".to_string(),
                "/admin".to_string(),
                "/withdraw".to_string(),
                "/referral".to_string(),
            ],
            login_path: "/auth/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
            return_param: "returnUrl".to_string(),
            locales: vec!["en".to_string(), "ru".to_string()],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("text" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: EdgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend.path_prefix, "/api");
        assert_eq!(config.session.access_cookie_max_age_secs, 604_800);
        assert_eq!(config.session.locale_cookie_name, "NEXT_LOCALE");
        assert_eq!(config.routes.return_param, "returnUrl");
        assert_eq!(config.backend.malformed_json, MalformedJsonPolicy::Reject);
        assert!(config.backend.request_timeout_secs < config.timeouts.request_secs);
    }

    #[test]
    fn test_partial_sections() {
        let config: EdgeConfig = toml::from_str(
            r#"
            [backend]
            origin = "http://api.internal:8000"
            malformed_json = "drop"

            [routes]
            locales = ["en"]
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.origin, "http://api.internal:8000");
        assert_eq!(config.backend.malformed_json, MalformedJsonPolicy::Drop);
        assert_eq!(config.backend.path_prefix, "/api");
        assert_eq!(config.routes.locales, vec!["en".to_string()]);
        assert_eq!(config.routes.login_path, "/auth/login");
    }
}
