use crate::copy::CopyState;
use crate::error::{FileShareError, Result};
use crate::file::client::{FileServiceClient, RequestTemplate};
use crate::file::metadata::Metadata;
use crate::file::properties::{ContentSettings, FileProperties};
use crate::file::share::configure;
use crate::file::uri::StorageUri;
use crate::sas::{
    IpAddressOrRange, SasResource, SharedAccessHeaders, SharedAccessPolicy, SharedAccessProtocol,
    SharedAccessSignatureBuilder,
};
use crate::stream::{FileReadStream, FileWriteStream, OpenReadOptions, OpenWriteOptions};
use crate::transport::headers::{X_MS_CONTENT_LENGTH, X_MS_CONTENT_MD5, X_MS_RANGE, X_MS_TYPE};
use bytes::Bytes;
use reqwest::header;
use reqwest::Method;
use tracing::{debug, info};
use url::Url;

/// Handle to a file.
///
/// `properties`, `metadata` and the copy state are a snapshot: they change
/// only when an operation on this handle returns them.
#[derive(Debug, Clone)]
pub struct FileClient {
    pub(crate) client: FileServiceClient,
    share: String,
    path: String,
    uri: StorageUri,
    pub properties: FileProperties,
    pub metadata: Metadata,
    pub(crate) copy_state: Option<CopyState>,
}

impl FileClient {
    pub(crate) fn new(client: FileServiceClient, share: &str, path: &str) -> Result<Self> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(FileShareError::invalid_argument("File path cannot be empty"));
        }
        let uri = client.endpoint().join(share)?.join(path)?;
        Ok(Self {
            client,
            share: share.to_string(),
            path: path.to_string(),
            uri,
            properties: FileProperties::default(),
            metadata: Metadata::new(),
            copy_state: None,
        })
    }

    pub fn share_name(&self) -> &str {
        &self.share
    }

    /// Path below the share root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn uri(&self) -> &StorageUri {
        &self.uri
    }

    pub fn service(&self) -> &FileServiceClient {
        &self.client
    }

    /// Copy state as of the last fetch, if the file was ever a copy destination.
    pub fn copy_state(&self) -> Option<&CopyState> {
        self.copy_state.as_ref()
    }

    /// Primary URI with the client's token applied.
    pub fn authorized_uri(&self) -> Url {
        self.client.credentials().transform_uri(&self.uri.primary)
    }

    pub(crate) async fn send(&self, template: &RequestTemplate) -> Result<crate::transport::StorageResponse> {
        self.client.send(&self.uri, template).await
    }

    /// Create (or replace) the file with `size` zero bytes, sending the
    /// handle's content settings and metadata.
    pub async fn create(&mut self, size: u64) -> Result<()> {
        let mut template = RequestTemplate::new(Method::PUT)
            .header(X_MS_TYPE, "file")?
            .header(X_MS_CONTENT_LENGTH, size.to_string())?;
        apply_content_settings(&mut template, &self.properties.content)?;
        self.metadata.apply_to(&mut template)?;

        let response = self.send(&template).await?;
        self.record_write(&response.headers);
        self.properties.content_length = size;
        self.properties.content_md5 = None;
        info!(share = %self.share, path = %self.path, size, "created file");
        Ok(())
    }

    pub async fn delete(&self) -> Result<()> {
        self.send(&RequestTemplate::new(Method::DELETE)).await?;
        info!(share = %self.share, path = %self.path, "deleted file");
        Ok(())
    }

    pub async fn exists(&mut self) -> Result<bool> {
        match self.fetch_attributes().await {
            Ok(()) => Ok(true),
            Err(FileShareError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Refresh properties, metadata and copy state from the service.
    pub async fn fetch_attributes(&mut self) -> Result<()> {
        let response = self.send(&RequestTemplate::new(Method::HEAD)).await?;
        self.properties = FileProperties::from_headers(&response.headers);
        self.metadata = Metadata::from_headers(&response.headers);
        self.copy_state = CopyState::from_headers(&response.headers)?;
        debug!(path = %self.path, etag = ?self.properties.etag, "fetched file attributes");
        Ok(())
    }

    /// Replace the file's metadata with the handle's.
    pub async fn set_metadata(&mut self) -> Result<()> {
        let mut template = RequestTemplate::new(Method::PUT).query("comp", "metadata");
        self.metadata.apply_to(&mut template)?;
        let response = self.send(&template).await?;
        self.record_write(&response.headers);
        Ok(())
    }

    /// Replace the file's content settings (and stored MD5) with the handle's.
    pub async fn set_properties(&mut self) -> Result<()> {
        let mut template = RequestTemplate::new(Method::PUT).query("comp", "properties");
        apply_content_settings(&mut template, &self.properties.content)?;
        if let Some(md5) = &self.properties.content_md5 {
            template.set_header(X_MS_CONTENT_MD5, md5)?;
        }
        let response = self.send(&template).await?;
        self.record_write(&response.headers);
        Ok(())
    }

    /// Truncate or zero-extend the file. Content settings are re-sent so the
    /// service keeps them.
    pub async fn resize(&mut self, size: u64) -> Result<()> {
        let mut template = RequestTemplate::new(Method::PUT)
            .query("comp", "properties")
            .header(X_MS_CONTENT_LENGTH, size.to_string())?;
        apply_content_settings(&mut template, &self.properties.content)?;
        let response = self.send(&template).await?;
        self.record_write(&response.headers);
        self.properties.content_length = size;
        debug!(path = %self.path, size, "resized file");
        Ok(())
    }

    /// Download `length` bytes at `offset`. The result is shorter when the
    /// range runs past the end of the file.
    pub async fn download_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let template = RequestTemplate::new(Method::GET)
            .header(X_MS_RANGE, range_header(offset, length))?;
        Ok(self.send(&template).await?.body)
    }

    /// Download the whole file through a read stream.
    pub async fn download_to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut stream = self.open_read(OpenReadOptions::default()).await?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await?;
        self.properties = stream.file().properties.clone();
        Ok(data)
    }

    /// Replace the file with `data` through a write stream.
    pub async fn upload_from_bytes(&mut self, data: &[u8]) -> Result<()> {
        let mut stream = self.open_write(Some(data.len() as u64), OpenWriteOptions::default()).await?;
        stream.write(data).await?;
        stream.close().await?;
        self.properties = stream.file().properties.clone();
        Ok(())
    }

    pub async fn open_read(&self, options: OpenReadOptions) -> Result<FileReadStream> {
        FileReadStream::open(self.clone(), options).await
    }

    /// Open a write stream. `Some(size)` creates the file with that length;
    /// `None` writes into the existing file.
    pub async fn open_write(
        &self,
        size: Option<u64>,
        options: OpenWriteOptions,
    ) -> Result<FileWriteStream> {
        FileWriteStream::open(self.clone(), size, options).await
    }

    /// Mint a file-scoped token with the client's account key.
    pub fn shared_access_signature(
        &self,
        policy: SharedAccessPolicy,
        headers: Option<SharedAccessHeaders>,
        protocol: Option<SharedAccessProtocol>,
        ip: Option<IpAddressOrRange>,
    ) -> Result<String> {
        let resource = SasResource::File {
            account: self.client.account_name().to_string(),
            share: self.share.clone(),
            path: self.path.clone(),
        };
        let builder = configure(SharedAccessSignatureBuilder::new(resource, policy), headers, protocol, ip);
        self.client.credentials().sign(&builder)
    }

    /// Record the ETag and last-modified time a write returned.
    pub(crate) fn record_write(&mut self, headers: &header::HeaderMap) {
        let written = FileProperties::from_headers(headers);
        if written.etag.is_some() {
            self.properties.etag = written.etag;
        }
        if written.last_modified.is_some() {
            self.properties.last_modified = written.last_modified;
        }
        self.properties.is_server_encrypted |= written.is_server_encrypted;
    }
}

fn apply_content_settings(template: &mut RequestTemplate, content: &ContentSettings) -> Result<()> {
    for (name, value) in content.header_pairs() {
        if let Some(value) = value {
            template.set_header(name, value)?;
        }
    }
    Ok(())
}

/// `x-ms-range` value for `length` bytes at `offset`.
/// Saturates at `u64::MAX`; a zero length names the single byte at `offset`.
pub(crate) fn range_header(offset: u64, length: u64) -> String {
    let end = offset.saturating_add(length.saturating_sub(1));
    format!("bytes={offset}-{end}")
}
