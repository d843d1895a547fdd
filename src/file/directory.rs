use crate::error::{FileShareError, Result};
use crate::file::client::{FileServiceClient, RequestTemplate};
use crate::file::file::FileClient;
use crate::file::metadata::Metadata;
use crate::file::properties::DirectoryProperties;
use crate::file::uri::StorageUri;
use quick_xml::de;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Length in bytes; `None` for directories.
    pub content_length: Option<u64>,
}

/// Handle to a directory. The root directory of a share has an empty path.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: FileServiceClient,
    share: String,
    path: String,
    uri: StorageUri,
    pub properties: DirectoryProperties,
    pub metadata: Metadata,
}

impl DirectoryClient {
    pub(crate) fn new(client: FileServiceClient, share: &str, path: &str, uri: StorageUri) -> Self {
        Self {
            client,
            share: share.to_string(),
            path: path.to_string(),
            uri,
            properties: DirectoryProperties::default(),
            metadata: Metadata::new(),
        }
    }

    pub fn share_name(&self) -> &str {
        &self.share
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn uri(&self) -> &StorageUri {
        &self.uri
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn file(&self, name: &str) -> Result<FileClient> {
        FileClient::new(self.client.clone(), &self.share, &self.child_path(name)?)
    }

    pub fn directory(&self, name: &str) -> Result<DirectoryClient> {
        let path = self.child_path(name)?;
        let uri = self.uri.join(name)?;
        Ok(DirectoryClient::new(self.client.clone(), &self.share, &path, uri))
    }

    fn child_path(&self, name: &str) -> Result<String> {
        let name = name.trim_matches('/');
        if name.is_empty() {
            return Err(FileShareError::invalid_argument("Entry name cannot be empty"));
        }
        Ok(if self.is_root() {
            name.to_string()
        } else {
            format!("{}/{name}", self.path)
        })
    }

    pub async fn create(&mut self) -> Result<()> {
        if self.is_root() {
            return Err(FileShareError::invalid_argument(
                "The root directory exists with its share and cannot be created",
            ));
        }
        let mut template = RequestTemplate::new(Method::PUT).query("restype", "directory");
        self.metadata.apply_to(&mut template)?;
        let response = self.client.send(&self.uri, &template).await?;
        self.properties = DirectoryProperties::from_headers(&response.headers);
        info!(share = %self.share, path = %self.path, "created directory");
        Ok(())
    }

    pub async fn delete(&self) -> Result<()> {
        let template = RequestTemplate::new(Method::DELETE).query("restype", "directory");
        self.client.send(&self.uri, &template).await?;
        info!(share = %self.share, path = %self.path, "deleted directory");
        Ok(())
    }

    pub async fn exists(&mut self) -> Result<bool> {
        match self.fetch_attributes().await {
            Ok(()) => Ok(true),
            Err(FileShareError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn fetch_attributes(&mut self) -> Result<()> {
        let template = RequestTemplate::new(Method::HEAD).query("restype", "directory");
        let response = self.client.send(&self.uri, &template).await?;
        self.properties = DirectoryProperties::from_headers(&response.headers);
        self.metadata = Metadata::from_headers(&response.headers);
        Ok(())
    }

    /// List files and subdirectories, following continuation markers.
    pub async fn list(&self) -> Result<Vec<ListEntry>> {
        let mut entries = Vec::new();
        let mut marker = String::new();

        loop {
            let mut template = RequestTemplate::new(Method::GET)
                .query("restype", "directory")
                .query("comp", "list");
            if !marker.is_empty() {
                template = template.query("marker", marker.clone());
            }

            let response = self.client.send(&self.uri, &template).await?;
            let page = parse_listing(&response.body)?;
            entries.extend(page.entries);

            match page.next_marker {
                Some(next) => marker = next,
                None => break,
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    entries: Entries,
    #[serde(default)]
    next_marker: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Entries {
    #[serde(default)]
    file: Vec<FileItem>,
    #[serde(default)]
    directory: Vec<DirectoryItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileItem {
    name: String,
    #[serde(default)]
    properties: FileItemProperties,
}

#[derive(Debug, Default, Deserialize)]
struct FileItemProperties {
    #[serde(rename = "Content-Length", default)]
    content_length: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DirectoryItem {
    name: String,
}

struct ListingPage {
    entries: Vec<ListEntry>,
    next_marker: Option<String>,
}

fn parse_listing(body: &[u8]) -> Result<ListingPage> {
    let xml = std::str::from_utf8(body)
        .map_err(|e| FileShareError::serialization(format!("Listing is not UTF-8: {e}")))?;
    let results: EnumerationResults = de::from_str(xml)
        .map_err(|e| FileShareError::serialization(format!("Failed to parse listing: {e}")))?;

    let files = results.entries.file.into_iter().map(|f| ListEntry {
        name: f.name,
        kind: EntryKind::File,
        content_length: Some(f.properties.content_length.unwrap_or(0)),
    });
    let directories = results.entries.directory.into_iter().map(|d| ListEntry {
        name: d.name,
        kind: EntryKind::Directory,
        content_length: None,
    });

    Ok(ListingPage {
        entries: files.chain(directories).collect(),
        next_marker: Some(results.next_marker).filter(|m| !m.is_empty()),
    })
}
