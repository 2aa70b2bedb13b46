//! Authenticated, rate-limited admission gateway for an MCP server.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use error::GateError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
