//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request-id/trace/timeout layers)
//!     → request.rs (request ID, body limit, RequestDescriptor)
//!     → proxy::forwarder (upstream call)
//!     → response.rs (ResponseDescriptor → client)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{InboundSettings, X_REQUEST_ID};
pub use server::HttpServer;
