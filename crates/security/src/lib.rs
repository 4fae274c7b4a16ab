//! Request gating for Parley.
//!
//! Provides:
//! - **Rate limiting**: per-key token buckets keyed by route, identity and
//!   client address

pub mod rate_limit;

pub use rate_limit::{DEFAULT_MAX_BUCKETS, Limiter, RateDecision, RateLimiter, rate_key};
