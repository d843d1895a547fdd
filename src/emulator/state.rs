//! In-memory model of shares, directories and files.

use crate::copy::{CopyState, CopyStatus};
use crate::file::{ContentSettings, Metadata};
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::BTreeMap;

/// Version stamp shared by every kind of entity.
#[derive(Debug, Clone)]
pub(crate) struct Stamp {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct ShareEntry {
    pub stamp: Stamp,
    pub metadata: Metadata,
    pub quota_gib: u32,
    pub directories: BTreeMap<String, DirectoryEntry>,
    pub files: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Clone)]
pub(crate) struct DirectoryEntry {
    pub stamp: Stamp,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub(crate) struct FileEntry {
    pub stamp: Stamp,
    pub metadata: Metadata,
    pub content: Vec<u8>,
    pub settings: ContentSettings,
    pub content_md5: Option<String>,
    pub copy: Option<CopyRecord>,
}

/// A copy into a file, with the source bytes captured when it started.
#[derive(Debug, Clone)]
pub(crate) struct CopyRecord {
    pub state: CopyState,
    pub source_content: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct ServiceState {
    pub shares: BTreeMap<String, ShareEntry>,
    etag_sequence: u64,
    copy_sequence: u64,
}

pub(crate) const DEFAULT_QUOTA_GIB: u32 = 5120;

impl ServiceState {
    pub fn stamp(&mut self) -> Stamp {
        self.etag_sequence += 1;
        Stamp {
            etag: format!("\"0x8D{:014X}\"", self.etag_sequence),
            last_modified: Utc::now().trunc_subsecs(0),
        }
    }

    pub fn next_copy_id(&mut self) -> String {
        self.copy_sequence += 1;
        format!("{:08x}-0000-4000-8000-{:012x}", self.copy_sequence, self.copy_sequence)
    }

    pub fn new_share(&mut self, quota_gib: Option<u32>, metadata: Metadata) -> ShareEntry {
        ShareEntry {
            stamp: self.stamp(),
            metadata,
            quota_gib: quota_gib.unwrap_or(DEFAULT_QUOTA_GIB),
            directories: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn new_file(&mut self, size: usize, settings: ContentSettings, metadata: Metadata) -> FileEntry {
        FileEntry {
            stamp: self.stamp(),
            metadata,
            content: vec![0; size],
            settings,
            content_md5: None,
            copy: None,
        }
    }

    /// Complete every pending copy with the source bytes it captured.
    pub fn complete_pending_copies(&mut self) -> usize {
        self.finish_pending(|file, now| {
            file.content = file_copy_source(file);
            let total = file.content.len() as u64;
            if let Some(record) = &mut file.copy {
                record.state.status = CopyStatus::Success;
                record.state.bytes_copied = Some(total);
                record.state.total_bytes = Some(total);
                record.state.completion_time = Some(now);
            }
        })
    }

    /// Fail every pending copy; the destinations are left empty.
    pub fn fail_pending_copies(&mut self, description: &str) -> usize {
        self.finish_pending(|file, now| {
            file.content.clear();
            if let Some(record) = &mut file.copy {
                record.state.status = CopyStatus::Failed;
                record.state.completion_time = Some(now);
                record.state.status_description = Some(description.to_string());
            }
        })
    }

    fn finish_pending(&mut self, mut finish: impl FnMut(&mut FileEntry, DateTime<Utc>)) -> usize {
        let pending: Vec<(String, String)> = self
            .shares
            .iter()
            .flat_map(|(share_name, share)| {
                share
                    .files
                    .iter()
                    .filter(|(_, file)| file.has_pending_copy())
                    .map(move |(path, _)| (share_name.clone(), path.clone()))
            })
            .collect();

        for (share, path) in &pending {
            let stamp = self.stamp();
            if let Some(file) = self
                .shares
                .get_mut(share)
                .and_then(|share| share.files.get_mut(path))
            {
                finish(file, stamp.last_modified);
                file.stamp = stamp;
            }
        }
        pending.len()
    }
}

fn file_copy_source(file: &FileEntry) -> Vec<u8> {
    file.copy
        .as_ref()
        .map(|record| record.source_content.clone())
        .unwrap_or_default()
}

impl FileEntry {
    pub fn has_pending_copy(&self) -> bool {
        matches!(&self.copy, Some(record) if record.state.status == CopyStatus::Pending)
    }
}

impl ShareEntry {
    /// Whether `path` names the root or an existing directory.
    pub fn directory_exists(&self, path: &str) -> bool {
        path.is_empty() || self.directories.contains_key(path)
    }

    pub fn is_directory_empty(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        !self.directories.keys().any(|p| p.starts_with(&prefix))
            && !self.files.keys().any(|p| p.starts_with(&prefix))
    }

    /// Direct children of the directory at `path`: (files, directories).
    pub fn children(&self, path: &str) -> (Vec<(&str, &FileEntry)>, Vec<&str>) {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let files = self
            .files
            .iter()
            .filter_map(|(p, file)| direct_child(&prefix, p).map(|name| (name, file)))
            .collect();
        let directories = self
            .directories
            .keys()
            .filter_map(|p| direct_child(&prefix, p))
            .collect();
        (files, directories)
    }
}

/// Name of `path` when it sits directly under `prefix`.
fn direct_child<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    path.strip_prefix(prefix).filter(|rest| !rest.contains('/'))
}

/// Parent directory of a `/`-separated path; empty for top-level entries.
pub(crate) fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etags_are_unique_and_quoted() {
        let mut state = ServiceState::default();
        let a = state.stamp().etag;
        let b = state.stamp().etag;
        assert_ne!(a, b);
        assert!(a.starts_with('"') && a.ends_with('"'));
    }

    #[test]
    fn test_children_are_direct_only() {
        let mut state = ServiceState::default();
        let mut share = state.new_share(None, Metadata::new());
        for dir in ["a", "a/b"] {
            share.directories.insert(
                dir.to_string(),
                DirectoryEntry {
                    stamp: state.stamp(),
                    metadata: Metadata::new(),
                },
            );
        }
        for file in ["top.txt", "a/one.txt", "a/b/deep.txt"] {
            let entry = state.new_file(1, ContentSettings::default(), Metadata::new());
            share.files.insert(file.to_string(), entry);
        }

        let (files, dirs) = share.children("a");
        assert_eq!(files.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec!["one.txt"]);
        assert_eq!(dirs, vec!["b"]);

        let (files, dirs) = share.children("");
        assert_eq!(files.len(), 1);
        assert_eq!(dirs, vec!["a"]);
        assert!(!share.is_directory_empty("a"));
        assert!(share.is_directory_empty("a/b/deep.txt"));
        assert_eq!(parent_of("a/b/deep.txt"), "a/b");
        assert_eq!(parent_of("top.txt"), "");
    }
}
