//! Client-side session lifecycle.
//!
//! # Data Flow
//! ```text
//! login / register / callback
//!     → client.rs (one HTTP call, raw status + body)
//!     → manager.rs (interpret, commit)
//!     → store.rs (atomic token/user snapshot)
//!     → cookies.rs + storage.rs (access cookie, durable refresh token)
//!     → watch channel (state broadcast to the route guard)
//! ```
//!
//! # Design Decisions
//! - Access token lives in memory and a cookie; the refresh token lives in
//!   durable storage only
//! - One refresh in flight at a time, shared by every caller that hit 401
//! - Logout invalidates locally first and wins any race with a refresh

pub mod cache;
pub mod client;
pub mod cookies;
pub mod error;
pub mod manager;
pub mod storage;
pub mod store;
pub mod types;

pub use cache::QueryCache;
pub use client::{ApiClient, ApiRequest, ApiResponse};
pub use cookies::{CookieJar, CookieSpec, SameSite};
pub use error::SessionError;
pub use manager::SessionManager;
pub use storage::{DurableStorage, FileStorage, MemoryStorage, StorageError};
pub use store::{SessionSnapshot, SessionStore};
pub use types::{RegisterOutcome, SessionState, TokenPair, UserRole, UserSnapshot};
