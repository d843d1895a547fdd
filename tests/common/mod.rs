#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use fileshare::emulator::{MemoryTransport, DEVELOPMENT_KEY};
use fileshare::file::{FileClient, FileServiceClient, RequestOptions, ShareClient};
use fileshare::sas::{SharedAccessPermissions, SharedAccessPolicy};
use fileshare::utils::RetryOptions;
use fileshare::StorageCredentials;
use std::time::Duration;

pub const SHARE: &str = "testshare";

/// Retries with millisecond backoff so fault-injection tests stay fast.
pub fn fast_options() -> RequestOptions {
    RequestOptions {
        retry: RetryOptions {
            max_retries: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
        },
        ..RequestOptions::default()
    }
}

pub fn key_client(service: &MemoryTransport) -> FileServiceClient {
    service
        .account_key_client(DEVELOPMENT_KEY)
        .unwrap()
        .with_options(fast_options())
        .unwrap()
}

pub fn sas_client(service: &MemoryTransport, token: &str) -> FileServiceClient {
    service
        .client(StorageCredentials::sas(token))
        .unwrap()
        .with_options(fast_options())
        .unwrap()
}

/// A fresh service with one share, plus an account-key client for it.
pub async fn setup() -> (MemoryTransport, FileServiceClient, ShareClient) {
    let service = MemoryTransport::development().unwrap();
    let client = key_client(&service);
    let mut share = client.share(SHARE).unwrap();
    share.create().await.unwrap();
    (service, client, share)
}

pub async fn upload(share: &ShareClient, path: &str, data: &[u8]) -> FileClient {
    let mut file = share.file(path).unwrap();
    file.upload_from_bytes(data).await.unwrap();
    file
}

/// Deterministic, non-repeating-looking test content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 251) as u8).collect()
}

pub fn policy(permissions: SharedAccessPermissions) -> SharedAccessPolicy {
    SharedAccessPolicy::new(permissions, Utc::now() + ChronoDuration::hours(1))
}
