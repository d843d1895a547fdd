//! Synchronous facade
//!
//! Drives the async operations on an owned multi-threaded runtime. The
//! stream wrappers implement `std::io::{Read, Write, Seek}`, so they plug
//! into `std::io::copy` and friends. Do not use these types from inside an
//! async context.

use crate::copy::CopyState;
use crate::error::Result;
use crate::file::FileClient;
use crate::stream::{FileReadStream, FileWriteStream, OpenReadOptions, OpenWriteOptions};
use std::io::{self, SeekFrom};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use url::Url;

fn runtime() -> Result<Arc<Runtime>> {
    Ok(Arc::new(
        Builder::new_multi_thread()
            .enable_all()
            .thread_name("fileshare-blocking")
            .build()?,
    ))
}

/// Blocking wrapper around a [`FileClient`].
#[derive(Debug)]
pub struct BlockingFile {
    runtime: Arc<Runtime>,
    file: FileClient,
}

impl BlockingFile {
    pub fn new(file: FileClient) -> Result<Self> {
        Ok(Self::with_runtime(file, runtime()?))
    }

    /// Share a runtime between several blocking handles.
    pub fn with_runtime(file: FileClient, runtime: Arc<Runtime>) -> Self {
        Self { runtime, file }
    }

    pub fn file(&self) -> &FileClient {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut FileClient {
        &mut self.file
    }

    pub fn create(&mut self, size: u64) -> Result<()> {
        self.runtime.block_on(self.file.create(size))
    }

    pub fn fetch_attributes(&mut self) -> Result<()> {
        self.runtime.block_on(self.file.fetch_attributes())
    }

    pub fn upload_from_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.runtime.block_on(self.file.upload_from_bytes(data))
    }

    pub fn download_to_bytes(&mut self) -> Result<Vec<u8>> {
        self.runtime.block_on(self.file.download_to_bytes())
    }

    pub fn start_copy(&mut self, source: &Url) -> Result<String> {
        self.runtime.block_on(self.file.start_copy(source))
    }

    pub fn abort_copy(&mut self, copy_id: &str) -> Result<()> {
        self.runtime.block_on(self.file.abort_copy(copy_id))
    }

    pub fn wait_for_copy(&mut self, poll_interval: Duration) -> Result<CopyState> {
        self.runtime.block_on(self.file.wait_for_copy(poll_interval))
    }

    pub fn open_read(&self, options: OpenReadOptions) -> Result<BlockingReadStream> {
        let inner = self.runtime.block_on(self.file.open_read(options))?;
        Ok(BlockingReadStream {
            runtime: self.runtime.clone(),
            inner,
        })
    }

    pub fn open_write(&self, size: Option<u64>, options: OpenWriteOptions) -> Result<BlockingWriteStream> {
        let inner = self.runtime.block_on(self.file.open_write(size, options))?;
        Ok(BlockingWriteStream {
            runtime: self.runtime.clone(),
            inner,
        })
    }
}

/// [`FileReadStream`] behind `std::io::Read + Seek`.
#[derive(Debug)]
pub struct BlockingReadStream {
    runtime: Arc<Runtime>,
    inner: FileReadStream,
}

impl BlockingReadStream {
    pub fn length(&mut self) -> Result<u64> {
        self.runtime.block_on(self.inner.length())
    }

    pub fn into_inner(self) -> FileReadStream {
        self.inner
    }
}

impl io::Read for BlockingReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.runtime.block_on(self.inner.read(buf))?)
    }
}

impl io::Seek for BlockingReadStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.runtime.block_on(self.inner.seek(pos))?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.inner.position())
    }
}

/// [`FileWriteStream`] behind `std::io::Write + Seek`. Call
/// [`BlockingWriteStream::close`] when done.
#[derive(Debug)]
pub struct BlockingWriteStream {
    runtime: Arc<Runtime>,
    inner: FileWriteStream,
}

impl BlockingWriteStream {
    pub fn length(&self) -> u64 {
        self.inner.length()
    }

    pub fn close(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }
}

impl io::Write for BlockingWriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.runtime.block_on(self.inner.write(buf))?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.runtime.block_on(self.inner.flush())?)
    }
}

impl io::Seek for BlockingWriteStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.runtime.block_on(self.inner.seek(pos))?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.inner.position())
    }
}
