//! Request disguise and pacing noise.
//!
//! Supplies realistic browser header sets and the randomised delays used by
//! the rate limiter and retry backoff.

pub mod behavior;
pub mod fingerprint;
