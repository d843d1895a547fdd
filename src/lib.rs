//! fileshare - client library for SMB-style cloud file shares
//!
//! Mints shared access signatures, applies credentials to resource URIs,
//! drives server-side copies and streams file content through ranged
//! reads and writes. A blocking facade and an in-process emulator of the
//! service ship alongside the async API.

pub mod auth;
pub mod blocking;
pub mod cli;
pub mod config;
pub mod copy;
pub mod emulator;
pub mod error;
pub mod file;
pub mod operation;
pub mod sas;
pub mod stream;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use auth::{CredentialMode, StorageCredentials};
pub use error::{FileShareError, Result};
pub use file::{DirectoryClient, FileClient, FileServiceClient, ShareClient};
pub use operation::Operation;
