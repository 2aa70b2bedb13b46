//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + MCP_API_KEYS
//!     → loader.rs (parse, merge environment keys)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → server swaps in the new key set
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the key set is hot-swapped; limiter settings need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, AuthMode, GatewayConfig, LimiterComposition, ListenerConfig, LogFormat,
    ObservabilityConfig, RateLimitConfig, TimeoutConfig, UpstreamConfig,
};
