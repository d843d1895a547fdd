//! Resource handles
//!
//! A [`FileServiceClient`] hands out [`ShareClient`], [`DirectoryClient`]
//! and [`FileClient`] handles. Handles cache the properties and metadata
//! the service last returned for them; nothing refreshes them implicitly.

pub mod client;
pub mod directory;
#[allow(clippy::module_inception)]
pub mod file;
pub mod metadata;
pub mod properties;
pub mod share;
pub mod uri;

pub use client::{FileServiceClient, RequestOptions};
pub use directory::{DirectoryClient, EntryKind, ListEntry};
pub use file::FileClient;
pub use metadata::Metadata;
pub use properties::{ContentSettings, DirectoryProperties, FileProperties, ShareProperties};
pub use share::ShareClient;
pub use uri::{LocationMode, StorageUri};
