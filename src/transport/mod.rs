//! Transport seam
//!
//! The client never talks to the network directly: every request is a
//! [`StorageRequest`] handed to a [`Transport`]. [`HttpTransport`] sends
//! it with reqwest; [`crate::emulator::MemoryTransport`] answers it in
//! process.

pub mod headers;
pub mod http;
pub mod shared_key;

use crate::error::{FileShareError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

pub use http::HttpTransport;

/// A fully built request, before or after authorization.
#[derive(Debug, Clone)]
pub struct StorageRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl StorageRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Set a header, rejecting names or values that cannot go on the wire.
    pub fn header(mut self, name: &str, value: impl AsRef<str>) -> Result<Self> {
        self.set_header(name, value)?;
        Ok(self)
    }

    pub fn set_header(&mut self, name: &str, value: impl AsRef<str>) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FileShareError::invalid_argument(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value.as_ref()).map_err(|e| {
            FileShareError::invalid_argument(format!("Invalid value for header '{name}': {e}"))
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Status, headers and body of a response.
#[derive(Debug, Clone)]
pub struct StorageResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl StorageResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn error_code(&self) -> Option<&str> {
        self.header_str(headers::X_MS_ERROR_CODE)
    }
}

/// Something that can carry a [`StorageRequest`] to the service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: StorageRequest) -> Result<StorageResponse>;
}
