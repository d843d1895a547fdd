mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::*;
use fileshare::blocking::BlockingFile;
use fileshare::emulator::MemoryTransport;
use fileshare::file::{FileServiceClient, LocationMode, RequestOptions, ShareClient};
use fileshare::stream::{OpenReadOptions, OpenWriteOptions};
use fileshare::transport::headers::X_MS_RANGE;
use fileshare::transport::StorageRequest;
use fileshare::{FileShareError, Operation};
use rand::{rngs::StdRng, Rng, SeedableRng};
use reqwest::header::IF_MATCH;
use reqwest::{Method, StatusCode};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

const SMALL: usize = 1024;

fn small_options() -> RequestOptions {
    RequestOptions {
        minimum_read_size: SMALL,
        stream_write_size: SMALL,
        ..fast_options()
    }
}

fn small_client(service: &MemoryTransport) -> FileServiceClient {
    key_client(service).with_options(small_options()).unwrap()
}

async fn small_setup() -> (MemoryTransport, ShareClient) {
    let (service, _client, _share) = setup().await;
    let share = small_client(&service).share(SHARE).unwrap();
    (service, share)
}

fn range_reads(requests: &[StorageRequest]) -> Vec<&StorageRequest> {
    requests
        .iter()
        .filter(|r| r.method == Method::GET && r.header_str(X_MS_RANGE).is_some())
        .collect()
}

#[cfg(test)]
mod read_stream_tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_around_read_size() {
        let (_service, share) = small_setup().await;

        for size in [0, 1, SMALL - 1, SMALL, SMALL + 1, 5 * SMALL + 17] {
            let data = pattern(size);
            let path = format!("round-trip-{size}.bin");
            let file = upload(&share, &path, &data).await;

            let mut stream = file.open_read(OpenReadOptions::default()).await.unwrap();
            let mut out = Vec::new();
            stream.read_to_end(&mut out).await.unwrap();
            assert_eq!(out, data, "content mismatch for {size} bytes");
            assert_eq!(stream.length().await.unwrap(), size as u64);
        }
    }

    #[tokio::test]
    async fn test_reads_near_and_past_the_end() {
        let (_service, share) = small_setup().await;
        let data = pattern(3000);
        let file = upload(&share, "tail.bin", &data).await;

        let mut stream = file.open_read(OpenReadOptions::default()).await.unwrap();
        let length = stream.length().await.unwrap();
        stream.seek(SeekFrom::Start(length - 128)).await.unwrap();
        let mut buf = vec![0u8; 1024];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 128);
        assert_eq!(&buf[..128], &data[data.len() - 128..]);
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);

        stream.seek(SeekFrom::End(500)).await.unwrap();
        assert_eq!(stream.position(), length + 500);
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);

        let err = stream.seek(SeekFrom::Current(-(length as i64) - 600)).await.unwrap_err();
        assert!(matches!(err, FileShareError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_fetches_use_minimum_read_size() {
        let (service, share) = small_setup().await;
        let file = upload(&share, "ranges.bin", &pattern(4 * SMALL)).await;

        let mut stream = file.open_read(OpenReadOptions::default()).await.unwrap();
        service.clear_requests();

        let mut buf = [0u8; 10];
        for _ in 0..50 {
            stream.read(&mut buf).await.unwrap();
        }
        let requests = service.requests();
        let fetches = range_reads(&requests);
        assert_eq!(fetches.len(), 1, "small reads are served from one buffer");
        assert_eq!(fetches[0].header_str(X_MS_RANGE), Some("bytes=0-1023"));
    }

    #[tokio::test]
    async fn test_changed_file_fails_the_stream() {
        let (service, share) = small_setup().await;
        let file = upload(&share, "moving.bin", &pattern(4 * SMALL)).await;

        let mut stream = file.open_read(OpenReadOptions::default()).await.unwrap();
        let mut buf = vec![0u8; SMALL];
        assert_eq!(stream.read(&mut buf).await.unwrap(), SMALL);

        let mut writer = share.file("moving.bin").unwrap();
        writer.metadata.insert("touched", "yes");
        writer.set_metadata().await.unwrap();

        service.clear_requests();
        let err = stream.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, FileShareError::PreconditionFailed { .. }));
        assert_eq!(err.status(), Some(412));

        // Terminal: later reads fail without going back to the service
        let err = stream.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, FileShareError::PreconditionFailed { .. }));
        assert_eq!(range_reads(&service.requests()).len(), 1);
    }

    #[tokio::test]
    async fn test_deferred_open_pins_on_first_fetch() {
        let (service, share) = small_setup().await;
        let data = pattern(2 * SMALL + 5);
        upload(&share, "lazy.bin", &data).await;
        service.clear_requests();

        let file = share.file("lazy.bin").unwrap();
        let options = OpenReadOptions {
            prefetch_attributes: false,
            ..OpenReadOptions::default()
        };
        let mut stream = file.open_read(options).await.unwrap();
        assert!(service.requests().is_empty());
        assert_eq!(stream.etag(), None);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
        assert!(stream.etag().is_some());
        assert_eq!(stream.length().await.unwrap(), data.len() as u64);

        let requests = service.requests();
        let fetches = range_reads(&requests);
        assert!(fetches[0].header_str(IF_MATCH.as_str()).is_none());
        assert!(fetches[1..].iter().all(|r| r.header_str(IF_MATCH.as_str()) == stream.etag()));
    }

    #[tokio::test]
    async fn test_deferred_open_reads_nothing_near_u64_max() {
        let (service, share) = small_setup().await;
        let file = upload(&share, "far.bin", &pattern(100)).await;
        let options = OpenReadOptions {
            prefetch_attributes: false,
            ..OpenReadOptions::default()
        };
        let mut stream = file.open_read(options).await.unwrap();
        service.clear_requests();

        let mut buf = [0u8; 16];
        stream.seek(SeekFrom::Start(u64::MAX - 10)).await.unwrap();
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        let requests = service.requests();
        let fetches = range_reads(&requests);
        assert_eq!(fetches.len(), 1);
        assert_eq!(
            fetches[0].header_str(X_MS_RANGE),
            Some(format!("bytes={}-{}", u64::MAX - 10, u64::MAX - 1).as_str())
        );

        service.clear_requests();
        stream.seek(SeekFrom::Start(u64::MAX)).await.unwrap();
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        assert!(service.requests().is_empty());

        // The stream is still usable afterwards
        stream.seek(SeekFrom::Start(90)).await.unwrap();
        assert_eq!(stream.read(&mut buf).await.unwrap(), 10);
        assert_eq!(&buf[..10], &pattern(100)[90..]);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_same_range() {
        let (service, share) = small_setup().await;
        let data = pattern(3 * SMALL);
        let file = upload(&share, "flaky.bin", &data).await;

        let mut stream = file.open_read(OpenReadOptions::default()).await.unwrap();
        service.clear_requests();
        service.inject_faults([StatusCode::SERVICE_UNAVAILABLE, StatusCode::INTERNAL_SERVER_ERROR]);

        let mut buf = vec![0u8; 100];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 100);
        assert_eq!(&buf[..], &data[..100]);

        let requests = service.requests();
        let fetches = range_reads(&requests);
        assert_eq!(fetches.len(), 3);
        for fetch in &fetches {
            assert_eq!(fetch.header_str(X_MS_RANGE), Some("bytes=0-1023"));
            assert_eq!(fetch.header_str(IF_MATCH.as_str()), stream.etag());
        }
    }

    #[tokio::test]
    async fn test_retries_give_up_eventually() {
        let (service, share) = small_setup().await;
        let file = upload(&share, "down.bin", &pattern(10)).await;
        let mut stream = file.open_read(OpenReadOptions::default()).await.unwrap();

        service.inject_faults([StatusCode::SERVICE_UNAVAILABLE; 10]);
        let mut buf = [0u8; 10];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_secondary_serves_retried_reads() {
        let (service, _client, share) = setup().await;
        upload(&share, "geo.bin", &pattern(64)).await;

        let client = key_client(&service)
            .with_options(RequestOptions {
                location_mode: LocationMode::PrimaryThenSecondary,
                ..fast_options()
            })
            .unwrap();
        let file = client.share(SHARE).unwrap().file("geo.bin").unwrap();

        service.clear_requests();
        service.inject_faults([StatusCode::SERVICE_UNAVAILABLE]);
        let bytes = file.download_range(0, 64).await.unwrap();
        assert_eq!(bytes.as_ref(), &pattern(64)[..]);

        let hosts: Vec<String> = service
            .requests()
            .iter()
            .map(|r| r.url.host_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            hosts,
            vec![
                "devstoreaccount1.file.core.windows.net".to_string(),
                "devstoreaccount1-secondary.file.core.windows.net".to_string(),
            ]
        );
    }
}

#[cfg(test)]
mod write_stream_tests {
    use super::*;

    #[tokio::test]
    async fn test_write_grows_existing_file() {
        let (_service, share) = small_setup().await;
        let mut expected = pattern(100);
        let file = upload(&share, "grow.bin", &expected).await;

        let mut stream = file.open_write(None, OpenWriteOptions::default()).await.unwrap();
        stream.seek(SeekFrom::End(0)).await.unwrap();
        let tail = pattern(SMALL + 50);
        stream.write(&tail).await.unwrap();
        stream.close().await.unwrap();
        expected.extend_from_slice(&tail);

        let mut check = share.file("grow.bin").unwrap();
        assert_eq!(check.download_to_bytes().await.unwrap(), expected);
        assert_eq!(check.properties.content_length, expected.len() as u64);
    }

    #[tokio::test]
    async fn test_sequential_write_stores_md5() {
        let (_service, share) = small_setup().await;
        let data = pattern(3 * SMALL + 3);
        let file = share.file("hashed.bin").unwrap();

        let options = OpenWriteOptions {
            store_content_md5: true,
            ..OpenWriteOptions::default()
        };
        let mut stream = file.open_write(Some(data.len() as u64), options.clone()).await.unwrap();
        stream.write(&data).await.unwrap();
        stream.close().await.unwrap();

        let mut check = share.file("hashed.bin").unwrap();
        check.fetch_attributes().await.unwrap();
        let expected = STANDARD.encode(md5::compute(&data).0);
        assert_eq!(check.properties.content_md5.as_deref(), Some(expected.as_str()));

        // Seeking turns the hash off
        let mut stream = file.open_write(Some(8), options).await.unwrap();
        stream.write(b"abcd").await.unwrap();
        stream.seek(SeekFrom::Start(4)).await.unwrap();
        stream.write(b"efgh").await.unwrap();
        stream.close().await.unwrap();
        check.fetch_attributes().await.unwrap();
        assert_eq!(check.properties.content_md5, None);
        assert_eq!(check.download_to_bytes().await.unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn test_random_writes_and_reads_match_cursor() {
        let (_service, share) = small_setup().await;
        let file = share.file("random.bin").unwrap();
        let mut rng = StdRng::seed_from_u64(0x5eed);

        let mut expected = Cursor::new(vec![0u8; 4096]);
        let mut stream = file.open_write(Some(4096), OpenWriteOptions::default()).await.unwrap();
        for _ in 0..40 {
            let offset = rng.gen_range(0..4600u64);
            let chunk: Vec<u8> = (0..rng.gen_range(1..700)).map(|_| rng.gen()).collect();

            expected.seek(SeekFrom::Start(offset)).unwrap();
            expected.write_all(&chunk).unwrap();
            stream.seek(SeekFrom::Start(offset)).await.unwrap();
            stream.write(&chunk).await.unwrap();
        }
        stream.close().await.unwrap();
        let expected = expected.into_inner();
        assert_eq!(stream.length(), expected.len() as u64);

        let mut reader = file.open_read(OpenReadOptions::default()).await.unwrap();
        for _ in 0..40 {
            let offset = rng.gen_range(0..expected.len());
            let mut buf = vec![0u8; rng.gen_range(1..2000)];
            reader.seek(SeekFrom::Start(offset as u64)).await.unwrap();
            let read = reader.read(&mut buf).await.unwrap();
            assert!(read > 0);
            assert_eq!(&buf[..read], &expected[offset..offset + read]);
        }
    }

    #[tokio::test]
    async fn test_closed_stream_rejects_writes() {
        let (_service, share) = small_setup().await;
        let file = share.file("closed.bin").unwrap();
        let mut stream = file.open_write(Some(4), OpenWriteOptions::default()).await.unwrap();
        stream.write(b"done").await.unwrap();
        stream.close().await.unwrap();
        stream.close().await.unwrap();

        let err = stream.write(b"more").await.unwrap_err();
        assert!(matches!(err, FileShareError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_invalid_write_size_is_rejected() {
        let (_service, share) = small_setup().await;
        let file = share.file("bad.bin").unwrap();
        let options = OpenWriteOptions {
            stream_write_size: Some(0),
            ..OpenWriteOptions::default()
        };
        let err = file.open_write(Some(1), options).await.unwrap_err();
        assert!(matches!(err, FileShareError::InvalidArgument(_)));
    }
}

#[cfg(test)]
mod blocking_tests {
    use super::*;

    #[test]
    fn test_write_seek_write_matches_cursor() {
        let runtime = Arc::new(tokio::runtime::Runtime::new().unwrap());
        let service = MemoryTransport::development().unwrap();
        let client = small_client(&service);
        let file = runtime.block_on(async {
            let mut share = client.share(SHARE).unwrap();
            share.create().await.unwrap();
            share.file("scenario.bin").unwrap()
        });

        let first = pattern(2048);
        let second: Vec<u8> = pattern(1024).iter().map(|b| b.wrapping_add(7)).collect();

        let mut expected = Cursor::new(Vec::new());
        expected.write_all(&first).unwrap();
        expected.seek(SeekFrom::Start(1024)).unwrap();
        expected.write_all(&second).unwrap();

        let blocking = BlockingFile::with_runtime(file, runtime.clone());
        let mut writer = blocking.open_write(Some(0), OpenWriteOptions::default()).unwrap();
        writer.write_all(&first).unwrap();
        writer.seek(SeekFrom::Start(1024)).unwrap();
        writer.write_all(&second).unwrap();
        writer.close().unwrap();
        assert_eq!(writer.length(), 2048);

        let mut reader = blocking.open_read(OpenReadOptions::default()).unwrap();
        let mut actual = Vec::new();
        reader.read_to_end(&mut actual).unwrap();
        assert_eq!(actual, expected.into_inner());

        reader.seek(SeekFrom::End(-128)).unwrap();
        let mut tail = vec![0u8; 1024];
        assert_eq!(reader.read(&mut tail).unwrap(), 128);
    }

    #[test]
    fn test_blocking_errors_become_io_errors() {
        let runtime = Arc::new(tokio::runtime::Runtime::new().unwrap());
        let service = MemoryTransport::development().unwrap();
        let client = small_client(&service);
        let file = runtime.block_on(async {
            let mut share = client.share(SHARE).unwrap();
            share.create().await.unwrap();
            share.file("missing.bin").unwrap()
        });

        let blocking = BlockingFile::with_runtime(file, runtime);
        let err = blocking.open_read(OpenReadOptions::default()).unwrap_err();
        assert_eq!(err.status(), Some(404));

        let io_err: std::io::Error = err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound);
    }
}

#[cfg(test)]
mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_stops_slow_download() {
        let (service, share) = small_setup().await;
        let mut file = upload(&share, "slow.bin", &pattern(SMALL)).await;
        service.set_latency(Some(Duration::from_secs(30)));

        let operation = Operation::spawn(async move { file.download_to_bytes().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        operation.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), operation.join())
            .await
            .expect("cancelled operation resolves promptly");
        assert!(matches!(result, Err(FileShareError::Cancelled)));
    }

    #[tokio::test]
    async fn test_completion_callback_gets_result() {
        let (_service, share) = small_setup().await;
        let mut file = upload(&share, "callback.bin", b"callback").await;
        let (tx, rx) = tokio::sync::oneshot::channel();

        Operation::spawn(async move { file.download_to_bytes().await }).on_complete(move |result| {
            let _ = tx.send(result);
        });

        let result = rx.await.unwrap();
        assert_eq!(result.unwrap(), b"callback");
    }
}
