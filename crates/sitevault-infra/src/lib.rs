//! Sitevault Infrastructure
//!
//! Process-wide infrastructure for the storage core: in-memory rate limiting
//! with escalating blocks and a periodic sweep, plus telemetry initialization.

pub mod rate_limit;
pub mod telemetry;

pub use rate_limit::{KeyStatus, RateLimitDecision, RateLimiter};
