//! Routing subsystem: page-route protection.
//!
//! # Data Flow
//! ```text
//! Navigation event (path) / session-state change
//!     → matcher.rs (locale split, segment-boundary prefix match)
//!     → guard.rs (classify → decide → concrete redirect target)
//!     → Allow | Defer | RedirectTo(target)
//! ```
//!
//! # Design Decisions
//! - Route table compiled at startup, immutable at runtime
//! - No regex (prefix matching only)
//! - Deterministic: same path and state always give the same verdict

pub mod guard;
pub mod matcher;

pub use guard::{AuthStatus, Decision, GuardDecision, GuardWatcher, RouteClassification, RouteGuard, RouteTable};
