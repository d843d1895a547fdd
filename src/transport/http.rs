use super::{StorageRequest, StorageResponse, Transport};
use crate::error::Result;
use crate::utils::network::{classify_network_error, create_http_client, NetworkConfig};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// [`Transport`] over a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        Ok(Self {
            client: create_http_client(config)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: StorageRequest) -> Result<StorageResponse> {
        let url = request.url.to_string();
        debug!(method = %request.method, path = request.url.path(), "sending request");

        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| classify_network_error(&e, &url))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_network_error(&e, &url))?;

        debug!(status = status.as_u16(), bytes = body.len(), "response received");
        Ok(StorageResponse {
            status,
            headers,
            body,
        })
    }
}
