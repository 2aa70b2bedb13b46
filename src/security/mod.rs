//! Security subsystem: the request admission gate.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → credentials.rs (pull bearer token, absence is normal)
//!     → auth.rs (required: 401 on missing/unknown key; optional: annotate)
//!     → rate_limit.rs (per-identity fixed window, 429 when exceeded)
//!     → Forward to upstream
//! ```
//!
//! # Design Decisions
//! - Identity is the API key when authenticated, the source IP otherwise
//! - Window counters are a standalone value type (window.rs)
//! - Limiter composition is configured, not implied by layer order

pub mod auth;
pub mod credentials;
pub mod rate_limit;
pub mod window;

pub use auth::{AuthContext, Authenticator, KeyStore};
pub use credentials::{extract_bearer, Credential};
pub use rate_limit::{AdmissionLimiter, FixedWindowLimiter, Identity, Thresholds};
pub use window::{Decision, WindowCounter};
