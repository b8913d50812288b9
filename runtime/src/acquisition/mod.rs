//! Acquisition: getting page bytes off the wire.
//!
//! A pooled HTTP client per host with a shared retry policy. Every request
//! waits on the host's rate limiter first.

pub mod http_client;
pub mod retry;
