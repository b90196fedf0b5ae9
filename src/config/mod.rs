//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EdgeConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend origin is read-only after startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, EdgeConfig, ListenerConfig, MalformedJsonPolicy, ObservabilityConfig,
    RouteTableConfig, SecurityConfig, SessionConfig, TimeoutConfig,
};
pub use validation::ValidationError;
