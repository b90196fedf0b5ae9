//! Edge layer for the investment platform: an API relay in front of the
//! backend plus the client-side session lifecycle and page-route guard.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod security;
pub mod session;

pub use config::schema::EdgeConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ProxyForwarder;
pub use routing::RouteGuard;
pub use session::SessionManager;
