//! Request-forwarding proxy.
//!
//! # Data Flow
//! ```text
//! axum handler
//!     → http/request.rs (inbound request → RequestDescriptor)
//!     → forwarder.rs (header policy, body normalization, upstream call)
//!     → ResponseDescriptor
//!     → http/response.rs (ResponseDescriptor → axum response)
//! ```
//!
//! # Design Decisions
//! - Descriptors are transient: created and dropped within one call
//! - Shared state between connections is limited to the read-only
//!   backend configuration and the pooled client

pub mod descriptor;
pub mod forwarder;

pub use descriptor::{ProxyMethod, QueryParams, RequestDescriptor, ResponseDescriptor};
pub use forwarder::{ProxyError, ProxyForwarder};
