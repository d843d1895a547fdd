use crate::error::Result;
use crate::transport::headers::X_MS_META_PREFIX;
use crate::file::client::RequestTemplate;
use reqwest::header::HeaderMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// User metadata of a share, directory or file.
///
/// Keys compare case-insensitively; the casing of the most recent insert is
/// kept for display and for the wire.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: BTreeMap<String, (String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        self.entries
            .insert(key.to_lowercase(), (key, value.into()))
            .map(|(_, old)| old)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(&key.to_lowercase()).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Read every `x-ms-meta-*` header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut metadata = Self::new();
        for (name, value) in headers {
            if let Some(key) = name.as_str().strip_prefix(X_MS_META_PREFIX) {
                if let Ok(value) = value.to_str() {
                    metadata.insert(key, value);
                }
            }
        }
        metadata
    }

    /// Write every entry as an `x-ms-meta-*` header.
    pub(crate) fn apply_to(&self, template: &mut RequestTemplate) -> Result<()> {
        for (key, value) in self.iter() {
            template.set_header(&format!("{X_MS_META_PREFIX}{key}"), value)?;
        }
        Ok(())
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(key, (_, value))| other.entries.get(key).map(|(_, v)| v) == Some(value))
    }
}

impl Eq for Metadata {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}
