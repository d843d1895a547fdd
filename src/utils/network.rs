use crate::error::{FileShareError, Result};
use reqwest::Client;
use std::time::Duration;

/// Configuration for HTTP client with proper timeouts
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            user_agent: format!("fileshare/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a properly configured HTTP client with timeouts
pub fn create_http_client(config: &NetworkConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .user_agent(&config.user_agent)
        .build()
        .map_err(|e| FileShareError::network(format!("Failed to create HTTP client: {e}")))
}

/// Classify a transport-level failure.
///
/// Timeouts, dropped connections and gateway errors become
/// [`FileShareError::Transient`] so the retry layer reissues the request;
/// everything else is surfaced as a plain network error.
pub fn classify_network_error(error: &reqwest::Error, url: &str) -> FileShareError {
    let host = extract_host_from_url(url);

    if error.is_timeout() {
        return FileShareError::transient(
            None,
            format!("Request to '{host}' timed out"),
        );
    }

    if error.is_connect() {
        if is_dns_resolution_error(error) {
            return FileShareError::network(format!(
                "Unable to resolve storage endpoint '{host}'. Check the account name and endpoint."
            ));
        }

        return FileShareError::transient(
            None,
            format!("Failed to connect to storage endpoint '{host}': {error}"),
        );
    }

    let message = error.to_string().to_lowercase();
    if message.contains("ssl") || message.contains("tls") || message.contains("certificate") {
        return FileShareError::network(format!(
            "SSL/TLS connection error when accessing '{host}'"
        ));
    }

    if let Some(status) = error.status() {
        if matches!(status.as_u16(), 502..=504) {
            return FileShareError::transient(
                Some(status.as_u16()),
                format!("Gateway error when accessing '{host}'"),
            );
        }
    }

    if error.is_body() || error.is_decode() {
        return FileShareError::transient(
            None,
            format!("Connection to '{host}' dropped while reading the response: {error}"),
        );
    }

    FileShareError::network(format!("Network error when accessing '{host}': {error}"))
}

fn is_dns_resolution_error(error: &reqwest::Error) -> bool {
    let error_msg = error.to_string().to_lowercase();
    let dns_indicators = [
        "dns",
        "name resolution",
        "name or service not known",
        "nodename nor servname provided",
        "temporary failure in name resolution",
        "no such host",
        "host not found",
        "getaddrinfo failed",
        "could not resolve host",
    ];

    dns_indicators
        .iter()
        .any(|&indicator| error_msg.contains(indicator))
}

fn extract_host_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown-endpoint".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host_from_url() {
        let url = "https://acct.file.core.windows.net/share/dir/file?sv=2019-02-02";
        assert_eq!(extract_host_from_url(url), "acct.file.core.windows.net");
        assert_eq!(extract_host_from_url("not a url"), "unknown-endpoint");
    }

    #[test]
    fn test_default_user_agent_names_crate() {
        let config = NetworkConfig::default();
        assert!(config.user_agent.starts_with("fileshare/"));
        assert!(create_http_client(&config).is_ok());
    }
}
