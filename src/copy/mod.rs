//! Server-side copy
//!
//! Per destination file: `NoCopy -> Pending -> {Success, Aborted, Failed}`.
//! The operations live on [`crate::file::FileClient`].

pub mod orchestrator;
pub mod state;

pub use state::{parse_progress, CopyState, CopyStatus};
