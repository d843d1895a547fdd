use crate::error::{FileShareError, Result};
use crate::file::client::{FileServiceClient, RequestTemplate};
use crate::file::directory::DirectoryClient;
use crate::file::file::FileClient;
use crate::file::metadata::Metadata;
use crate::file::properties::ShareProperties;
use crate::file::uri::StorageUri;
use crate::sas::{
    IpAddressOrRange, SasResource, SharedAccessHeaders, SharedAccessPolicy, SharedAccessProtocol,
    SharedAccessSignatureBuilder,
};
use crate::transport::headers::X_MS_SHARE_QUOTA;
use reqwest::Method;
use tracing::info;

/// Handle to a share.
#[derive(Debug, Clone)]
pub struct ShareClient {
    pub(crate) client: FileServiceClient,
    name: String,
    uri: StorageUri,
    pub properties: ShareProperties,
    pub metadata: Metadata,
}

impl ShareClient {
    pub(crate) fn new(client: FileServiceClient, name: &str) -> Result<Self> {
        validate_share_name(name)?;
        let uri = client.endpoint().join(name)?;
        Ok(Self {
            client,
            name: name.to_string(),
            uri,
            properties: ShareProperties::default(),
            metadata: Metadata::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &StorageUri {
        &self.uri
    }

    pub fn service(&self) -> &FileServiceClient {
        &self.client
    }

    pub fn root_directory(&self) -> DirectoryClient {
        DirectoryClient::new(self.client.clone(), &self.name, "", self.uri.clone())
    }

    /// Handle to a file by its `/`-separated path below the share root.
    pub fn file(&self, path: &str) -> Result<FileClient> {
        FileClient::new(self.client.clone(), &self.name, path)
    }

    /// Handle to a directory by its `/`-separated path below the share root.
    pub fn directory(&self, path: &str) -> Result<DirectoryClient> {
        let path = path.trim_matches('/');
        let uri = self.uri.join(path)?;
        Ok(DirectoryClient::new(self.client.clone(), &self.name, path, uri))
    }

    /// Create the share, sending the handle's metadata and, if set, its quota.
    pub async fn create(&mut self) -> Result<()> {
        let mut template = RequestTemplate::new(Method::PUT).query("restype", "share");
        if let Some(quota) = self.properties.quota_gib {
            template.set_header(X_MS_SHARE_QUOTA, quota.to_string())?;
        }
        self.metadata.apply_to(&mut template)?;

        let response = self.client.send(&self.uri, &template).await?;
        let quota = self.properties.quota_gib;
        self.properties = ShareProperties::from_headers(&response.headers);
        self.properties.quota_gib = self.properties.quota_gib.or(quota);
        info!(share = %self.name, "created share");
        Ok(())
    }

    /// Create the share unless it already exists. Returns whether it was created.
    pub async fn create_if_not_exists(&mut self) -> Result<bool> {
        match self.create().await {
            Ok(()) => Ok(true),
            Err(FileShareError::Conflict { code, .. }) if code == "ShareAlreadyExists" => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self) -> Result<()> {
        let template = RequestTemplate::new(Method::DELETE).query("restype", "share");
        self.client.send(&self.uri, &template).await?;
        info!(share = %self.name, "deleted share");
        Ok(())
    }

    /// Whether the share exists; populates attributes when it does.
    pub async fn exists(&mut self) -> Result<bool> {
        match self.fetch_attributes().await {
            Ok(()) => Ok(true),
            Err(FileShareError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn fetch_attributes(&mut self) -> Result<()> {
        let template = RequestTemplate::new(Method::HEAD).query("restype", "share");
        let response = self.client.send(&self.uri, &template).await?;
        self.properties = ShareProperties::from_headers(&response.headers);
        self.metadata = Metadata::from_headers(&response.headers);
        Ok(())
    }

    /// Mint a share-scoped token with the client's account key.
    pub fn shared_access_signature(
        &self,
        policy: SharedAccessPolicy,
        headers: Option<SharedAccessHeaders>,
        protocol: Option<SharedAccessProtocol>,
        ip: Option<IpAddressOrRange>,
    ) -> Result<String> {
        let resource = SasResource::Share {
            account: self.client.account_name().to_string(),
            share: self.name.clone(),
        };
        let builder = configure(SharedAccessSignatureBuilder::new(resource, policy), headers, protocol, ip);
        self.client.credentials().sign(&builder)
    }
}

pub(crate) fn configure(
    mut builder: SharedAccessSignatureBuilder,
    headers: Option<SharedAccessHeaders>,
    protocol: Option<SharedAccessProtocol>,
    ip: Option<IpAddressOrRange>,
) -> SharedAccessSignatureBuilder {
    if let Some(headers) = headers {
        builder = builder.headers(headers);
    }
    if let Some(protocol) = protocol {
        builder = builder.protocol(protocol);
    }
    if let Some(ip) = ip {
        builder = builder.ip(ip);
    }
    builder
}

/// Share names: 3-63 lowercase letters, digits and single hyphens, starting
/// and ending with a letter or digit.
fn validate_share_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !(3..=63).contains(&name.len())
        || !valid_chars
        || name.starts_with('-')
        || name.ends_with('-')
        || name.contains("--")
    {
        return Err(FileShareError::invalid_argument(format!(
            "Invalid share name '{name}'"
        )));
    }
    Ok(())
}
