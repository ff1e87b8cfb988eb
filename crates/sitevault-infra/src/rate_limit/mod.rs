//! In-memory rate limiting keyed by (operation type, identifier).
//!
//! Fixed windows with escalating temporary blocks: a key that keeps hammering
//! a full window accumulates violations and, past the threshold, is blocked
//! outright for the operation's configured block duration. Rejection is a
//! normal decision outcome, never an error.

mod limiter;

pub use limiter::{KeyStatus, RateLimitDecision, RateLimiter};
