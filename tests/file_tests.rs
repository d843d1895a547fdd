mod common;

use common::*;
use fileshare::file::EntryKind;
use fileshare::FileShareError;

#[cfg(test)]
mod share_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_if_not_exists() {
        let (_service, client, _share) = setup().await;
        let mut share = client.share("another").unwrap();
        share.properties.quota_gib = Some(10);
        share.metadata.insert("owner", "tests");

        assert!(share.create_if_not_exists().await.unwrap());
        assert!(!share.create_if_not_exists().await.unwrap());

        let mut fetched = client.share("another").unwrap();
        assert!(fetched.exists().await.unwrap());
        assert_eq!(fetched.properties.quota_gib, Some(10));
        assert_eq!(fetched.metadata.get("owner"), Some("tests"));

        fetched.delete().await.unwrap();
        assert!(!fetched.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_share_names_are_rejected() {
        let (_service, client, _share) = setup().await;
        assert!(matches!(client.share(""), Err(FileShareError::InvalidArgument(_))));
        assert!(matches!(client.share("has/slash"), Err(FileShareError::InvalidArgument(_))));
    }
}

#[cfg(test)]
mod directory_tests {
    use super::*;

    #[tokio::test]
    async fn test_nested_directories_and_listing() {
        let (service, _client, share) = setup().await;
        service.set_list_page_size(2);

        let mut docs = share.directory("docs").unwrap();
        docs.create().await.unwrap();
        let mut drafts = docs.directory("drafts").unwrap();
        drafts.create().await.unwrap();
        assert_eq!(drafts.path(), "docs/drafts");

        for name in ["c.txt", "a.txt", "b.txt"] {
            let mut file = docs.file(name).unwrap();
            file.upload_from_bytes(name.as_bytes()).await.unwrap();
        }
        let mut nested = drafts.file("deep.txt").unwrap();
        nested.upload_from_bytes(b"deep").await.unwrap();
        assert_eq!(nested.path(), "docs/drafts/deep.txt");

        let entries = docs.list().await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "drafts"]);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].content_length, Some(5));
        assert_eq!(entries[3].kind, EntryKind::Directory);
        assert_eq!(entries[3].content_length, None);

        let root = share.root_directory().list().await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].name, "docs");
    }

    #[tokio::test]
    async fn test_directory_lifecycle() {
        let (_service, _client, share) = setup().await;
        let mut dir = share.directory("work").unwrap();
        assert!(!dir.exists().await.unwrap());
        dir.create().await.unwrap();
        assert!(dir.exists().await.unwrap());

        let file = upload(&share, "work/file.txt", b"x").await;
        let err = dir.delete().await.unwrap_err();
        assert_eq!(err.error_code(), Some("DirectoryNotEmpty"));

        file.delete().await.unwrap();
        dir.delete().await.unwrap();
        assert!(!dir.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_root_directory_cannot_be_created() {
        let (_service, _client, share) = setup().await;
        let mut root = share.root_directory();
        assert!(root.is_root());
        assert!(matches!(root.create().await, Err(FileShareError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_file_in_missing_directory() {
        let (_service, _client, share) = setup().await;
        let mut file = share.file("nowhere/file.txt").unwrap();
        let err = file.create(10).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.error_code(), Some("ParentNotFound"));
    }
}

#[cfg(test)]
mod file_handle_tests {
    use super::*;

    #[tokio::test]
    async fn test_exists_and_properties() {
        let (_service, _client, share) = setup().await;
        let mut file = share.file("report.csv").unwrap();
        assert!(!file.exists().await.unwrap());

        file.properties.content.content_type = Some("text/csv".to_string());
        file.create(0).await.unwrap();
        assert!(file.exists().await.unwrap());
        assert_eq!(file.properties.content_length, 0);
        assert_eq!(file.properties.content.content_type.as_deref(), Some("text/csv"));

        file.resize(42).await.unwrap();
        let mut fresh = share.file("report.csv").unwrap();
        fresh.fetch_attributes().await.unwrap();
        assert_eq!(fresh.properties.content_length, 42);
        assert_eq!(fresh.properties.content.content_type.as_deref(), Some("text/csv"));
        assert_eq!(fresh.download_to_bytes().await.unwrap(), vec![0u8; 42]);
    }

    #[tokio::test]
    async fn test_download_range_past_end_is_short() {
        let (_service, _client, share) = setup().await;
        let file = upload(&share, "short.bin", &pattern(100)).await;

        let bytes = file.download_range(90, 50).await.unwrap();
        assert_eq!(bytes.as_ref(), &pattern(100)[90..]);
        assert!(file.download_range(100, 10).await.is_err());
        assert!(file.download_range(0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_writes_are_unconditional() {
        let (_service, _client, share) = setup().await;
        let mut first = upload(&share, "race.txt", b"v1").await;
        let mut second = share.file("race.txt").unwrap();
        second.upload_from_bytes(b"v2").await.unwrap();

        // Still holding the v1 ETag; metadata writes carry no If-Match
        first.metadata.insert("k", "v");
        first.set_metadata().await.unwrap();
        assert_ne!(first.properties.etag, second.properties.etag);
    }
}
