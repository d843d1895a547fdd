//! Authentication module
//!
//! Credentials (anonymous, shared access signature, account key) and the
//! transform that turns a resource URI or request into an authorized one.

pub mod credentials;
pub mod signing;

pub use credentials::{CredentialMode, StorageCredentials};
