//! Utility functions module
//!
//! Retry with backoff, HTTP client construction and the date formats the
//! service speaks.

pub mod datetime;
pub mod network;
pub mod retry;

pub use network::*;
pub use retry::*;
