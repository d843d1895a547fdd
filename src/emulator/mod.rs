//! In-process file service
//!
//! [`MemoryTransport`] answers requests the way the service does: shares,
//! directories and files with ranges and ETags, `If-Match`, the copy state
//! machine, SAS and shared-key verification. It also injects faults and
//! latency and records every request, which is what the test suite runs
//! against.

mod authorize;
mod handlers;
mod state;

use crate::auth::signing::decode_account_key;
use crate::auth::StorageCredentials;
use crate::error::{FileShareError, Result};
use crate::file::{FileServiceClient, StorageUri};
use crate::transport::{StorageRequest, StorageResponse, Transport};
use async_trait::async_trait;
use authorize::Authorizer;
use handlers::{error_response, Context};
use parking_lot::Mutex as SyncMutex;
use reqwest::StatusCode;
use state::ServiceState;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

/// Account name of the development emulator.
pub const DEVELOPMENT_ACCOUNT: &str = "devstoreaccount1";
/// Well-known key of the development emulator account.
pub const DEVELOPMENT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// When a started copy finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyCompletion {
    /// The copy is done by the time `start_copy` returns.
    #[default]
    Immediate,
    /// The copy stays pending until [`MemoryTransport::complete_pending_copies`]
    /// or [`MemoryTransport::fail_pending_copies`] is called.
    Manual,
}

struct Settings {
    copy_completion: CopyCompletion,
    latency: Option<Duration>,
    client_ip: Ipv4Addr,
    faults: VecDeque<StatusCode>,
    list_page_size: usize,
    requests: Vec<StorageRequest>,
}

struct Emulator {
    account: String,
    primary: Url,
    secondary: Url,
    key: Zeroizing<Vec<u8>>,
    state: Mutex<ServiceState>,
    settings: SyncMutex<Settings>,
}

/// Transport backed by an in-memory service. Clones share the same state.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Emulator>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("account", &self.inner.account)
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    /// An empty service for `account`, verifying signatures with `key`
    /// (base64).
    pub fn new(account: &str, key: &str) -> Result<Self> {
        if account.is_empty() || !account.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(FileShareError::invalid_argument(format!(
                "Invalid storage account name '{account}'"
            )));
        }
        Ok(Self {
            inner: Arc::new(Emulator {
                account: account.to_string(),
                primary: Url::parse(&format!("https://{account}.file.core.windows.net/"))?,
                secondary: Url::parse(&format!("https://{account}-secondary.file.core.windows.net/"))?,
                key: decode_account_key(key)?,
                state: Mutex::new(ServiceState::default()),
                settings: SyncMutex::new(Settings {
                    copy_completion: CopyCompletion::default(),
                    latency: None,
                    client_ip: Ipv4Addr::LOCALHOST,
                    faults: VecDeque::new(),
                    list_page_size: 5000,
                    requests: Vec::new(),
                }),
            }),
        })
    }

    /// An empty service for the development account.
    pub fn development() -> Result<Self> {
        Self::new(DEVELOPMENT_ACCOUNT, DEVELOPMENT_KEY)
    }

    pub fn account_name(&self) -> &str {
        &self.inner.account
    }

    pub fn primary_endpoint(&self) -> Url {
        self.inner.primary.clone()
    }

    pub fn secondary_endpoint(&self) -> Url {
        self.inner.secondary.clone()
    }

    pub fn storage_uri(&self) -> StorageUri {
        StorageUri::with_secondary(self.primary_endpoint(), self.secondary_endpoint())
    }

    /// A client over this transport.
    pub fn client(&self, credentials: StorageCredentials) -> Result<FileServiceClient> {
        FileServiceClient::new(self.storage_uri(), credentials, Arc::new(self.clone()))
    }

    /// A client signing with this account's key.
    pub fn account_key_client(&self, key: &str) -> Result<FileServiceClient> {
        self.client(StorageCredentials::account_key(&self.inner.account, key)?)
    }

    pub fn set_copy_completion(&self, completion: CopyCompletion) {
        self.inner.settings.lock().copy_completion = completion;
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.settings.lock().latency = latency;
    }

    /// Address SAS IP restrictions are checked against.
    pub fn set_client_ip(&self, ip: Ipv4Addr) {
        self.inner.settings.lock().client_ip = ip;
    }

    /// Entries per listing page.
    pub fn set_list_page_size(&self, size: usize) {
        self.inner.settings.lock().list_page_size = size.max(1);
    }

    /// Answer the next requests with these statuses (`ServerBusy`) instead
    /// of handling them.
    pub fn inject_faults(&self, statuses: impl IntoIterator<Item = StatusCode>) {
        self.inner.settings.lock().faults.extend(statuses);
    }

    /// Every request received so far, in order, as sent (authorization included).
    pub fn requests(&self) -> Vec<StorageRequest> {
        self.inner.settings.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.inner.settings.lock().requests.clear();
    }

    /// Finish every pending copy successfully. Returns how many finished.
    pub async fn complete_pending_copies(&self) -> usize {
        self.inner.state.lock().await.complete_pending_copies()
    }

    /// Fail every pending copy with `description`. Returns how many failed.
    pub async fn fail_pending_copies(&self, description: &str) -> usize {
        self.inner.state.lock().await.fail_pending_copies(description)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: StorageRequest) -> Result<StorageResponse> {
        let (latency, fault, copy_completion, client_ip, list_page_size) = {
            let mut settings = self.inner.settings.lock();
            settings.requests.push(request.clone());
            (
                settings.latency,
                settings.faults.pop_front(),
                settings.copy_completion,
                settings.client_ip,
                settings.list_page_size,
            )
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(status) = fault {
            debug!(status = status.as_u16(), "injected fault");
            return Ok(error_response(
                status,
                "ServerBusy",
                "The server is currently unable to receive requests. Please retry your request.",
            ));
        }

        let ctx = Context {
            account: &self.inner.account,
            authorizer: Authorizer {
                account: &self.inner.account,
                key: &self.inner.key,
                client_ip,
            },
            copy_completion,
            list_page_size,
        };

        let mut state = self.inner.state.lock().await;
        let response = handlers::handle(&mut state, &ctx, &request);
        debug!(
            method = %request.method,
            path = request.url.path(),
            status = response.status.as_u16(),
            "emulator handled request"
        );
        Ok(response)
    }
}
