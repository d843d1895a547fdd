//! Configuration management module
//!
//! Settings come from, in increasing priority: defaults, the configuration
//! file, `FILESHARE_*` environment variables and command-line flags.
//! Connection strings are accepted anywhere an account can be configured.

pub mod connection;
pub mod settings;

pub use settings::*;
