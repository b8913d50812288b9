//! Run output persistence.

pub mod logger;
