//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → headers.rs (allow-list request headers, synthesize origin)
//!     → forwarder
//! Backend response:
//!     → headers.rs (strip framing headers, split Set-Cookie)
//!     → client
//! ```
//!
//! # Design Decisions
//! - Fail closed: headers not in the request allow-list never leave the proxy
//! - Header tables are data, checked by tests that enumerate header names

pub mod headers;
