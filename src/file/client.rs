//! Service client and the request pipeline every handle goes through.

use crate::auth::StorageCredentials;
use crate::error::{FileShareError, Result};
use crate::file::share::ShareClient;
use crate::file::uri::{LocationMode, StorageUri};
use crate::transport::headers::{SERVICE_VERSION, X_MS_CLIENT_REQUEST_ID, X_MS_VERSION};
use crate::transport::{StorageRequest, StorageResponse, Transport};
use crate::utils::retry::{retry_with_backoff, RetryOptions};
use bytes::Bytes;
use quick_xml::de;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Default minimum size of a read-stream range fetch.
pub const DEFAULT_MINIMUM_READ_SIZE: usize = 4 * 1024 * 1024;
/// Largest range the service accepts in one `PUT ?comp=range`.
pub const MAX_RANGE_SIZE: usize = 4 * 1024 * 1024;

/// Options applied to every request a client sends.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub retry: RetryOptions,
    pub location_mode: LocationMode,
    pub minimum_read_size: usize,
    pub stream_write_size: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            retry: RetryOptions::default(),
            location_mode: LocationMode::PrimaryOnly,
            minimum_read_size: DEFAULT_MINIMUM_READ_SIZE,
            stream_write_size: MAX_RANGE_SIZE,
        }
    }
}

impl RequestOptions {
    pub fn validate(&self) -> Result<()> {
        if self.minimum_read_size == 0 {
            return Err(FileShareError::invalid_argument(
                "minimum_read_size must be greater than zero",
            ));
        }
        if self.stream_write_size == 0 || self.stream_write_size > MAX_RANGE_SIZE {
            return Err(FileShareError::invalid_argument(format!(
                "stream_write_size must be between 1 and {MAX_RANGE_SIZE} bytes"
            )));
        }
        Ok(())
    }
}

/// Method, query, headers and body of a call, re-materialized into a
/// fresh [`StorageRequest`] for each attempt.
#[derive(Debug, Clone)]
pub(crate) struct RequestTemplate {
    method: Method,
    query: Vec<(&'static str, String)>,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestTemplate {
    pub(crate) fn new(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub(crate) fn query(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    pub(crate) fn header(mut self, name: &str, value: impl AsRef<str>) -> Result<Self> {
        self.set_header(name, value)?;
        Ok(self)
    }

    pub(crate) fn set_header(&mut self, name: &str, value: impl AsRef<str>) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FileShareError::invalid_argument(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value.as_ref()).map_err(|e| {
            FileShareError::invalid_argument(format!("Invalid value for header '{name}': {e}"))
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub(crate) fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

struct ClientInner {
    endpoint: StorageUri,
    account: String,
    credentials: StorageCredentials,
    transport: Arc<dyn Transport>,
    options: RequestOptions,
}

/// Entry point of the library: an endpoint, credentials and a transport.
///
/// Cheap to clone. Every share, directory and file handle created from a
/// client shares its credentials, so a token swapped through
/// [`StorageCredentials::update_sas_token`] applies to all of them.
#[derive(Clone)]
pub struct FileServiceClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for FileServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileServiceClient")
            .field("endpoint", &self.inner.endpoint.primary.as_str())
            .field("account", &self.inner.account)
            .field("credentials", &self.inner.credentials)
            .finish_non_exhaustive()
    }
}

impl FileServiceClient {
    /// Create a client. The account name is taken from account-key
    /// credentials, or else from the first label of the endpoint host.
    pub fn new(
        endpoint: StorageUri,
        credentials: StorageCredentials,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let account = match credentials.account_name() {
            Some(account) => account,
            None => account_from_host(&endpoint)?,
        };
        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint,
                account,
                credentials,
                transport,
                options: RequestOptions::default(),
            }),
        })
    }

    /// Same endpoint, credentials and transport with different options.
    pub fn with_options(&self, options: RequestOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint: self.inner.endpoint.clone(),
                account: self.inner.account.clone(),
                credentials: self.inner.credentials.clone(),
                transport: self.inner.transport.clone(),
                options,
            }),
        })
    }

    pub fn endpoint(&self) -> &StorageUri {
        &self.inner.endpoint
    }

    pub fn account_name(&self) -> &str {
        &self.inner.account
    }

    pub fn credentials(&self) -> &StorageCredentials {
        &self.inner.credentials
    }

    pub fn options(&self) -> &RequestOptions {
        &self.inner.options
    }

    pub fn share(&self, name: &str) -> Result<ShareClient> {
        ShareClient::new(self.clone(), name)
    }

    /// Send a call against `uri`, retrying transient failures.
    ///
    /// Each attempt picks its location, gets a fresh client request id and
    /// is authorized with the credentials as they are at that moment.
    pub(crate) async fn send(
        &self,
        uri: &StorageUri,
        template: &RequestTemplate,
    ) -> Result<StorageResponse> {
        let options = &self.inner.options;
        retry_with_backoff(
            |attempt| async move {
                let request = self.materialize(uri, template, attempt)?;
                self.dispatch(request).await
            },
            &options.retry,
        )
        .await
    }

    fn materialize(
        &self,
        uri: &StorageUri,
        template: &RequestTemplate,
        attempt: usize,
    ) -> Result<StorageRequest> {
        let mut url = uri
            .select(self.inner.options.location_mode, template.is_read(), attempt)?
            .clone();
        if !template.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &template.query {
                pairs.append_pair(name, value);
            }
        }

        let mut request = StorageRequest::new(template.method.clone(), url);
        request.headers = template.headers.clone();
        request.body = template.body.clone();
        request.set_header(X_MS_VERSION, SERVICE_VERSION)?;
        request.set_header(X_MS_CLIENT_REQUEST_ID, Uuid::new_v4().to_string())?;
        self.inner.credentials.authorize(&mut request)?;
        Ok(request)
    }

    async fn dispatch(&self, request: StorageRequest) -> Result<StorageResponse> {
        let method = request.method.clone();
        let path = request.url.path().to_string();
        debug!(%method, %path, "sending request");

        let response = self.inner.transport.send(request).await?;
        debug!(%method, %path, status = response.status.as_u16(), "received response");

        if response.status.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(&response))
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ServiceErrorBody {
    code: String,
    message: String,
}

/// Map a non-success response, preferring `x-ms-error-code` over the body.
pub(crate) fn error_from_response(response: &StorageResponse) -> FileShareError {
    let body = std::str::from_utf8(&response.body)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| de::from_str::<ServiceErrorBody>(s).ok())
        .unwrap_or_default();

    let code = response
        .error_code()
        .map(str::to_string)
        .filter(|c| !c.is_empty())
        .unwrap_or(body.code);
    let message = if body.message.is_empty() {
        response
            .status
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string()
    } else {
        body.message.replace('\n', " ")
    };

    FileShareError::from_response(response.status, code, message)
}

fn account_from_host(endpoint: &StorageUri) -> Result<String> {
    endpoint
        .primary
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            FileShareError::invalid_argument(format!(
                "Cannot derive an account name from endpoint '{}'",
                endpoint.primary
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    fn endpoint() -> StorageUri {
        StorageUri::new(Url::parse("https://acct.file.core.windows.net").unwrap())
    }

    fn fast_retry() -> RequestOptions {
        RequestOptions {
            retry: RetryOptions {
                max_retries: 2,
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(2),
                multiplier: 1.0,
            },
            ..RequestOptions::default()
        }
    }

    fn failure(status: StatusCode, code: &str) -> StorageResponse {
        let mut response = StorageResponse::new(status);
        response
            .headers
            .insert("x-ms-error-code", HeaderValue::from_str(code).unwrap());
        response
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut transport = MockTransport::new();
        transport.expect_send().times(3).returning(move |request| {
            assert_eq!(request.header_str("x-ms-version"), Some(SERVICE_VERSION));
            assert!(request.url.query().unwrap().contains("sig=token"));
            match seen.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Ok(failure(StatusCode::SERVICE_UNAVAILABLE, "ServerBusy")),
                _ => Ok(StorageResponse::new(StatusCode::OK)),
            }
        });

        let client = FileServiceClient::new(
            endpoint(),
            StorageCredentials::sas("sig=token"),
            Arc::new(transport),
        )
        .unwrap()
        .with_options(fast_retry())
        .unwrap();

        let uri = client.endpoint().join("share/file").unwrap();
        let response = client
            .send(&uri, &RequestTemplate::new(Method::GET))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_precondition_failure_is_not_retried() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(failure(StatusCode::PRECONDITION_FAILED, "ConditionNotMet")));

        let client = FileServiceClient::new(endpoint(), StorageCredentials::anonymous(), Arc::new(transport))
            .unwrap()
            .with_options(fast_retry())
            .unwrap();

        let err = client
            .send(&client.endpoint().clone(), &RequestTemplate::new(Method::GET))
            .await
            .unwrap_err();
        assert!(matches!(err, FileShareError::PreconditionFailed { ref code, .. } if code == "ConditionNotMet"));
    }

    #[test]
    fn test_error_body_is_parsed() {
        let mut response = StorageResponse::new(StatusCode::CONFLICT);
        response.body = Bytes::from_static(
            b"<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>PendingCopyOperation</Code><Message>There is currently a pending copy operation.</Message></Error>",
        );

        match error_from_response(&response) {
            FileShareError::Conflict { code, message } => {
                assert_eq!(code, "PendingCopyOperation");
                assert!(message.starts_with("There is currently"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_account_from_host() {
        let client = FileServiceClient::new(
            endpoint(),
            StorageCredentials::anonymous(),
            Arc::new(MockTransport::new()),
        )
        .unwrap();
        assert_eq!(client.account_name(), "acct");
    }

    #[test]
    fn test_options_validation() {
        let options = RequestOptions {
            stream_write_size: MAX_RANGE_SIZE + 1,
            ..RequestOptions::default()
        };
        assert!(options.validate().is_err());
        assert!(RequestOptions::default().validate().is_ok());
    }
}
