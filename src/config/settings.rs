//! Client configuration settings
//!
//! Handles loading configuration from a file and the environment,
//! validation, and turning the result into a ready client.

use crate::auth::StorageCredentials;
use crate::error::{FileShareError, Result};
use crate::file::client::{DEFAULT_MINIMUM_READ_SIZE, MAX_RANGE_SIZE};
use crate::file::{FileServiceClient, LocationMode, RequestOptions, StorageUri};
use crate::transport::HttpTransport;
use crate::utils::network::NetworkConfig;
use crate::utils::retry::RetryOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub account_name: String,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    /// Primary file endpoint; derived from the account name when unset.
    pub file_endpoint: Option<String>,
    pub secondary_endpoint: Option<String>,
    pub location_mode: LocationMode,
    pub minimum_read_size: usize,
    pub stream_write_size: usize,
    pub retry: RetryOptions,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("sas_token", &self.sas_token.as_ref().map(|_| "<redacted>"))
            .field("file_endpoint", &self.file_endpoint)
            .field("secondary_endpoint", &self.secondary_endpoint)
            .field("location_mode", &self.location_mode)
            .field("minimum_read_size", &self.minimum_read_size)
            .field("stream_write_size", &self.stream_write_size)
            .field("retry", &self.retry)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let network = NetworkConfig::default();
        Self {
            account_name: String::new(),
            account_key: None,
            sas_token: None,
            file_endpoint: None,
            secondary_endpoint: None,
            location_mode: LocationMode::PrimaryOnly,
            minimum_read_size: DEFAULT_MINIMUM_READ_SIZE,
            stream_write_size: MAX_RANGE_SIZE,
            retry: RetryOptions::default(),
            connect_timeout_secs: network.connect_timeout.as_secs(),
            request_timeout_secs: network.request_timeout.as_secs(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.account_name.is_empty() && self.file_endpoint.is_none() {
            return Err(FileShareError::config(
                "Either account_name or file_endpoint is required",
            ));
        }

        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(FileShareError::config("Timeouts must be greater than zero"));
        }

        if self.location_mode != LocationMode::PrimaryOnly && self.storage_uri()?.secondary.is_none() {
            return Err(FileShareError::config(
                "location_mode requires a secondary endpoint",
            ));
        }

        self.request_options()
            .validate()
            .map_err(|e| FileShareError::config(e.to_string()))?;

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        // XDG layout on Linux and macOS, the platform directory elsewhere
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            use std::env;
            let config_dir = if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
                PathBuf::from(xdg_config_home)
            } else {
                let home_dir = env::var("HOME")
                    .map_err(|_| FileShareError::config("HOME environment variable not set"))?;
                PathBuf::from(home_dir).join(".config")
            };
            Ok(config_dir.join("fileshare").join("config.toml"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let config_dir = dirs::config_dir()
                .ok_or_else(|| FileShareError::config("Unable to determine config directory"))?;
            Ok(config_dir.join("fileshare").join("config.toml"))
        }
    }

    /// Primary and secondary endpoints of the file service.
    pub fn storage_uri(&self) -> Result<StorageUri> {
        let primary = match &self.file_endpoint {
            Some(endpoint) => Url::parse(endpoint)?,
            None => Url::parse(&format!("https://{}.file.core.windows.net/", self.account_name))?,
        };
        let secondary = match (&self.secondary_endpoint, &self.file_endpoint) {
            (Some(endpoint), _) => Some(Url::parse(endpoint)?),
            (None, None) => Some(Url::parse(&format!(
                "https://{}-secondary.file.core.windows.net/",
                self.account_name
            ))?),
            (None, Some(_)) => None,
        };

        Ok(match secondary {
            Some(secondary) => StorageUri::with_secondary(primary, secondary),
            None => StorageUri::new(primary),
        })
    }

    /// The account key wins over a SAS token; with neither, requests are anonymous.
    pub fn credentials(&self) -> Result<StorageCredentials> {
        match (&self.account_key, &self.sas_token) {
            (Some(key), _) => {
                if self.account_name.is_empty() {
                    return Err(FileShareError::config(
                        "account_name is required with account_key",
                    ));
                }
                StorageCredentials::account_key(&self.account_name, key)
            }
            (None, Some(token)) => Ok(StorageCredentials::sas(token.as_str())),
            (None, None) => Ok(StorageCredentials::anonymous()),
        }
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            retry: self.retry.clone(),
            location_mode: self.location_mode,
            minimum_read_size: self.minimum_read_size,
            stream_write_size: self.stream_write_size,
        }
    }

    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    /// A client over the HTTP transport.
    pub fn build_client(&self) -> Result<FileServiceClient> {
        self.validate()?;
        let transport = HttpTransport::new(&self.network_config())?;
        let uri = self.storage_uri()?;
        debug!(endpoint = %uri.primary, "building file service client");
        FileServiceClient::new(uri, self.credentials()?, Arc::new(transport))?
            .with_options(self.request_options())
    }

    pub async fn load() -> Result<Self> {
        load_config().await
    }

    pub async fn save(&self) -> Result<()> {
        save_config_to(self, &Self::get_config_path()?).await
    }
}

/// Load configuration with priority order:
/// 1. Command-line flags (handled by clap)
/// 2. Environment variables
/// 3. Configuration file
/// 4. Default values
pub async fn load_config() -> Result<ClientConfig> {
    let config = load_config_no_validation().await?;
    config.validate()?;
    Ok(config)
}

/// Load configuration without validation (for `fshare sas --inspect`)
pub async fn load_config_no_validation() -> Result<ClientConfig> {
    let config_path = ClientConfig::get_config_path()?;
    let mut config = if config_path.exists() {
        load_from_file(&config_path).await?
    } else {
        ClientConfig::default()
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

pub async fn load_from_file(path: &Path) -> Result<ClientConfig> {
    let contents = tokio::fs::read_to_string(path).await?;

    // TOML first, JSON as fallback
    if let Ok(config) = toml::from_str::<ClientConfig>(&contents) {
        return Ok(config);
    }

    let config = serde_json::from_str::<ClientConfig>(&contents)?;
    Ok(config)
}

/// Override `config` with `FILESHARE_*` variables read through `lookup`.
///
/// A connection string is applied first so the individual variables can
/// still override parts of it.
pub fn apply_env<F>(config: &mut ClientConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("FILESHARE_CONNECTION_STRING") {
        let parsed = ClientConfig::from_connection_string(&value)?;
        config.account_name = parsed.account_name;
        config.account_key = parsed.account_key.or(config.account_key.take());
        config.sas_token = parsed.sas_token.or(config.sas_token.take());
        config.file_endpoint = parsed.file_endpoint.or(config.file_endpoint.take());
        config.secondary_endpoint = parsed.secondary_endpoint.or(config.secondary_endpoint.take());
    }

    if let Some(value) = lookup("FILESHARE_ACCOUNT_NAME") {
        config.account_name = value;
    }

    if let Some(value) = lookup("FILESHARE_ACCOUNT_KEY") {
        config.account_key = Some(value);
    }

    if let Some(value) = lookup("FILESHARE_SAS_TOKEN") {
        config.sas_token = Some(value);
    }

    if let Some(value) = lookup("FILESHARE_ENDPOINT") {
        config.file_endpoint = Some(value);
    }

    if let Some(value) = lookup("FILESHARE_SECONDARY_ENDPOINT") {
        config.secondary_endpoint = Some(value);
    }

    if let Some(value) = lookup("FILESHARE_LOCATION_MODE") {
        config.location_mode = match value.to_lowercase().as_str() {
            "primary_only" => LocationMode::PrimaryOnly,
            "primary_then_secondary" => LocationMode::PrimaryThenSecondary,
            "secondary_only" => LocationMode::SecondaryOnly,
            other => {
                return Err(FileShareError::config(format!(
                    "Unknown FILESHARE_LOCATION_MODE '{other}'"
                )))
            }
        };
    }

    if let Some(value) = lookup("FILESHARE_MINIMUM_READ_SIZE") {
        config.minimum_read_size = parse_number("FILESHARE_MINIMUM_READ_SIZE", &value)?;
    }

    if let Some(value) = lookup("FILESHARE_STREAM_WRITE_SIZE") {
        config.stream_write_size = parse_number("FILESHARE_STREAM_WRITE_SIZE", &value)?;
    }

    if let Some(value) = lookup("FILESHARE_MAX_RETRIES") {
        config.retry.max_retries = parse_number("FILESHARE_MAX_RETRIES", &value)?;
    }

    if let Some(value) = lookup("FILESHARE_REQUEST_TIMEOUT") {
        config.request_timeout_secs = parse_number("FILESHARE_REQUEST_TIMEOUT", &value)?;
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FileShareError::config(format!("{name} must be a number, got '{value}'")))
}

pub async fn save_config_to(config: &ClientConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| FileShareError::serialization(e.to_string()))?;

    tokio::fs::write(path, contents).await?;

    Ok(())
}
