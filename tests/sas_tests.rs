mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use fileshare::emulator::MemoryTransport;
use fileshare::file::{FileServiceClient, StorageUri};
use fileshare::sas::{
    IpAddressOrRange, SharedAccessHeaders, SharedAccessPermissions, SharedAccessPolicy,
    SharedAccessProtocol, SharedAccessSignature,
};
use fileshare::{CredentialMode, FileShareError, StorageCredentials};
use std::net::Ipv4Addr;
use std::sync::Arc;
use url::Url;

const TARGET: &str = "target.txt";

fn check<T>(operation: &str, permissions: &str, granted: bool, result: Result<T, FileShareError>) {
    match (granted, result) {
        (true, Ok(_)) => {}
        (false, Err(e)) => assert_eq!(
            e.status(),
            Some(403),
            "{operation} with '{permissions}' should be denied with 403, got {e}"
        ),
        (true, Err(e)) => panic!("{operation} with '{permissions}' should succeed, got {e}"),
        (false, Ok(_)) => panic!("{operation} with '{permissions}' should be denied"),
    }
}

/// A SAS client that reaches the service over plain HTTP.
fn http_sas_client(service: &MemoryTransport, token: &str) -> FileServiceClient {
    let mut endpoint: Url = service.primary_endpoint();
    endpoint.set_scheme("http").unwrap();
    FileServiceClient::new(
        StorageUri::new(endpoint),
        StorageCredentials::sas(token),
        Arc::new(service.clone()),
    )
    .unwrap()
    .with_options(fast_options())
    .unwrap()
}

/// Exercise every operation kind with a token and check which ones the
/// service lets through.
async fn exercise(service: &MemoryTransport, token: &str, permissions: SharedAccessPermissions, share_scope: bool) {
    let letters = permissions.to_permission_string();
    let client = sas_client(service, token);
    let share = client.share(SHARE).unwrap();
    let mut file = share.file(TARGET).unwrap();

    check(
        "read",
        &letters,
        permissions.contains(SharedAccessPermissions::READ),
        file.fetch_attributes().await,
    );
    check(
        "write",
        &letters,
        permissions.contains(SharedAccessPermissions::WRITE),
        file.set_metadata().await,
    );
    check(
        "create",
        &letters,
        permissions.contains(SharedAccessPermissions::CREATE),
        file.create(16).await,
    );
    check(
        "list",
        &letters,
        share_scope && permissions.contains(SharedAccessPermissions::LIST),
        share.root_directory().list().await,
    );
    check(
        "delete",
        &letters,
        permissions.contains(SharedAccessPermissions::DELETE),
        file.delete().await,
    );
}

#[cfg(test)]
mod permission_matrix_tests {
    use super::*;

    #[tokio::test]
    async fn test_every_permission_combination_at_file_scope() {
        for bits in 1..=0b1_1111u8 {
            let permissions = SharedAccessPermissions::from_bits_truncate(bits);
            let (service, _client, share) = setup().await;
            let file = upload(&share, TARGET, b"sixteen bytes!!!").await;

            let token = file
                .shared_access_signature(policy(permissions), None, None, None)
                .unwrap();
            exercise(&service, &token, permissions, false).await;
        }
    }

    #[tokio::test]
    async fn test_every_permission_combination_at_share_scope() {
        for bits in 1..=0b1_1111u8 {
            let permissions = SharedAccessPermissions::from_bits_truncate(bits);
            let (service, _client, share) = setup().await;
            upload(&share, TARGET, b"sixteen bytes!!!").await;

            let token = share
                .shared_access_signature(policy(permissions), None, None, None)
                .unwrap();
            exercise(&service, &token, permissions, true).await;
        }
    }
}

#[cfg(test)]
mod restriction_tests {
    use super::*;

    #[tokio::test]
    async fn test_file_token_does_not_reach_other_files() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"mine").await;
        upload(&share, "other.txt", b"not mine").await;

        let token = file
            .shared_access_signature(policy(SharedAccessPermissions::READ), None, None, None)
            .unwrap();
        let client = sas_client(&service, &token);
        let mut other = client.share(SHARE).unwrap().file("other.txt").unwrap();

        let err = other.fetch_attributes().await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.error_code(), Some("AuthenticationFailed"));
    }

    #[tokio::test]
    async fn test_expired_and_not_yet_valid_tokens_are_rejected() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"data").await;
        let now = Utc::now();

        let expired = SharedAccessPolicy::new(SharedAccessPermissions::READ, now - ChronoDuration::hours(1))
            .with_start(now - ChronoDuration::hours(2));
        let future = SharedAccessPolicy::new(SharedAccessPermissions::READ, now + ChronoDuration::hours(2))
            .with_start(now + ChronoDuration::hours(1));

        for policy in [expired, future] {
            let token = file.shared_access_signature(policy, None, None, None).unwrap();
            let mut handle = sas_client(&service, &token).share(SHARE).unwrap().file(TARGET).unwrap();
            let err = handle.fetch_attributes().await.unwrap_err();
            assert_eq!(err.status(), Some(403));
        }
    }

    #[tokio::test]
    async fn test_ip_restriction_is_enforced() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"data").await;
        let range = IpAddressOrRange::range(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 9)).unwrap();
        let token = file
            .shared_access_signature(policy(SharedAccessPermissions::READ), None, None, Some(range))
            .unwrap();
        let mut handle = sas_client(&service, &token).share(SHARE).unwrap().file(TARGET).unwrap();

        service.set_client_ip(Ipv4Addr::new(10, 0, 0, 5));
        handle.fetch_attributes().await.unwrap();

        service.set_client_ip(Ipv4Addr::new(192, 168, 1, 1));
        let err = handle.fetch_attributes().await.unwrap_err();
        assert_eq!(err.error_code(), Some("AuthorizationSourceIPMismatch"));
    }

    #[tokio::test]
    async fn test_https_only_token_is_rejected_over_http() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"data").await;
        let token = file
            .shared_access_signature(
                policy(SharedAccessPermissions::READ),
                None,
                Some(SharedAccessProtocol::HttpsOnly),
                None,
            )
            .unwrap();
        assert!(token.contains("spr=https&"));

        let mut over_https = sas_client(&service, &token).share(SHARE).unwrap().file(TARGET).unwrap();
        over_https.fetch_attributes().await.unwrap();

        let mut over_http = http_sas_client(&service, &token).share(SHARE).unwrap().file(TARGET).unwrap();
        assert_eq!(over_http.authorized_uri().scheme(), "http");
        let err = over_http.fetch_attributes().await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.error_code(), Some("AuthorizationProtocolMismatch"));
    }

    #[tokio::test]
    async fn test_https_or_http_token_accepts_both() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"data").await;
        let token = file
            .shared_access_signature(
                policy(SharedAccessPermissions::READ),
                None,
                Some(SharedAccessProtocol::HttpsOrHttp),
                None,
            )
            .unwrap();
        assert_eq!(
            SharedAccessSignature::parse(&token).unwrap().protocol_restriction().unwrap(),
            Some(SharedAccessProtocol::HttpsOrHttp)
        );

        for client in [sas_client(&service, &token), http_sas_client(&service, &token)] {
            let mut handle = client.share(SHARE).unwrap().file(TARGET).unwrap();
            handle.fetch_attributes().await.unwrap();
            assert_eq!(handle.properties.content_length, 4);
        }
    }

    #[tokio::test]
    async fn test_tampered_token_is_rejected() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"data").await;
        let token = file
            .shared_access_signature(policy(SharedAccessPermissions::READ), None, None, None)
            .unwrap();

        // Claim more than was signed
        let tampered = token.replace("sp=r", "sp=rwd");
        assert_ne!(tampered, token);
        let mut handle = sas_client(&service, &tampered).share(SHARE).unwrap().file(TARGET).unwrap();
        let err = handle.delete().await.unwrap_err();
        assert_eq!(err.error_code(), Some("AuthenticationFailed"));
        handle.fetch_attributes().await.unwrap_err();
    }

    #[tokio::test]
    async fn test_anonymous_requests_are_rejected() {
        let (service, _client, share) = setup().await;
        upload(&share, TARGET, b"data").await;

        let client = service.client(StorageCredentials::anonymous()).unwrap();
        let mut file = client.share(SHARE).unwrap().file(TARGET).unwrap();
        let err = file.fetch_attributes().await.unwrap_err();
        assert_eq!(err.error_code(), Some("NoAuthenticationInformation"));
    }

    #[tokio::test]
    async fn test_header_overrides_apply_to_responses() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"<p>hi</p>").await;
        let headers = SharedAccessHeaders {
            content_type: Some("text/html".to_string()),
            content_disposition: Some("attachment; filename=page.html".to_string()),
            ..SharedAccessHeaders::default()
        };
        let token = file
            .shared_access_signature(policy(SharedAccessPermissions::READ), Some(headers), None, None)
            .unwrap();

        let parsed = SharedAccessSignature::parse(&token).unwrap();
        assert_eq!(parsed.headers.content_type.as_deref(), Some("text/html"));

        let mut handle = sas_client(&service, &token).share(SHARE).unwrap().file(TARGET).unwrap();
        handle.fetch_attributes().await.unwrap();
        assert_eq!(handle.properties.content.content_type.as_deref(), Some("text/html"));
        assert_eq!(
            handle.properties.content.content_disposition.as_deref(),
            Some("attachment; filename=page.html")
        );
    }

    #[tokio::test]
    async fn test_token_cannot_be_minted_without_account_key() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"data").await;
        let token = file
            .shared_access_signature(policy(SharedAccessPermissions::READ), None, None, None)
            .unwrap();

        let client = sas_client(&service, &token);
        assert_eq!(client.credentials().mode(), CredentialMode::SharedAccessSignature);
        let handle = client.share(SHARE).unwrap().file(TARGET).unwrap();
        let err = handle
            .shared_access_signature(policy(SharedAccessPermissions::READ), None, None, None)
            .unwrap_err();
        assert!(matches!(err, FileShareError::InvalidArgument(_)));
    }
}

#[cfg(test)]
mod credential_tests {
    use super::*;

    #[tokio::test]
    async fn test_sas_hot_swap_reauthorizes_existing_handles() {
        let (service, _client, share) = setup().await;
        let file = upload(&share, TARGET, b"swap me").await;

        let read_only = file
            .shared_access_signature(policy(SharedAccessPermissions::READ), None, None, None)
            .unwrap();
        let read_write = file
            .shared_access_signature(
                policy(SharedAccessPermissions::READ | SharedAccessPermissions::WRITE),
                None,
                None,
                None,
            )
            .unwrap();

        let credentials = StorageCredentials::sas(read_only);
        let client = service.client(credentials.clone()).unwrap();
        let mut handle = client.share(SHARE).unwrap().file(TARGET).unwrap();

        handle.fetch_attributes().await.unwrap();
        handle.metadata.insert("stage", "one");
        let err = handle.set_metadata().await.unwrap_err();
        assert_eq!(err.error_code(), Some("AuthorizationPermissionMismatch"));

        credentials.update_sas_token(format!("?{read_write}")).unwrap();
        handle.set_metadata().await.unwrap();
        handle.fetch_attributes().await.unwrap();
        assert_eq!(handle.metadata.get("stage"), Some("one"));
    }

    #[tokio::test]
    async fn test_authorized_uri_carries_token_only_for_sas() {
        let (service, client, share) = setup().await;
        let file = upload(&share, TARGET, b"data").await;
        assert_eq!(file.authorized_uri().query(), None);

        let token = file
            .shared_access_signature(policy(SharedAccessPermissions::READ), None, None, None)
            .unwrap();
        let sas_file = sas_client(&service, &token).share(SHARE).unwrap().file(TARGET).unwrap();
        let uri = sas_file.authorized_uri();
        assert_eq!(uri.query(), Some(token.as_str()));
        assert_eq!(uri.path(), file.uri().primary.path());
        assert_eq!(client.account_name(), sas_file.service().account_name());
    }
}
