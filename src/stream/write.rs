use crate::error::{FileShareError, Result};
use crate::file::client::RequestTemplate;
use crate::file::file::range_header;
use crate::file::FileClient;
use crate::stream::options::OpenWriteOptions;
use crate::transport::headers::{X_MS_RANGE, X_MS_WRITE};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::Method;
use std::io::SeekFrom;
use tracing::{debug, info, warn};

/// Buffered sequential writer over a remote file.
///
/// Writes accumulate until `stream_write_size` bytes are buffered, then go
/// out as one `PUT ?comp=range`. Seeking flushes first. Writing past the
/// remote length grows the file before the range upload, so the result is
/// the same as writing to a `Cursor<Vec<u8>>`: gaps left by seeking past
/// the end read back as zeros.
pub struct FileWriteStream {
    file: FileClient,
    length: u64,
    buffer_start: u64,
    buffer: Vec<u8>,
    write_size: usize,
    md5: Option<md5::Context>,
    closed: bool,
}

impl FileWriteStream {
    pub(crate) async fn open(
        mut file: FileClient,
        size: Option<u64>,
        options: OpenWriteOptions,
    ) -> Result<Self> {
        let write_size = options.resolve_write_size(file.service().options().stream_write_size)?;

        let length = match size {
            Some(size) => {
                file.create(size).await?;
                size
            }
            None => {
                file.fetch_attributes().await?;
                file.properties.content_length
            }
        };

        debug!(path = %file.path(), length, write_size, "opened write stream");
        Ok(Self {
            file,
            length,
            buffer_start: 0,
            buffer: Vec::with_capacity(write_size),
            write_size,
            md5: options.store_content_md5.then(md5::Context::new),
            closed: false,
        })
    }

    pub fn file(&self) -> &FileClient {
        &self.file
    }

    /// Position the next write lands at.
    pub fn position(&self) -> u64 {
        self.buffer_start + self.buffer.len() as u64
    }

    /// Length of the file once buffered bytes are flushed.
    pub fn length(&self) -> u64 {
        self.length.max(self.position())
    }

    /// Buffer all of `data`, uploading each full run of `stream_write_size` bytes.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.check_open()?;

        let mut remaining = data;
        while !remaining.is_empty() {
            let take = remaining.len().min(self.write_size - self.buffer.len());
            let (chunk, rest) = remaining.split_at(take);
            self.buffer.extend_from_slice(chunk);
            if let Some(md5) = &mut self.md5 {
                md5.consume(chunk);
            }
            remaining = rest;

            if self.buffer.len() == self.write_size {
                self.flush_buffer().await?;
            }
        }
        Ok(data.len())
    }

    /// Move the write position, flushing buffered bytes first.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open()?;
        self.flush_buffer().await?;

        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.buffer_start.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            FileShareError::invalid_argument("Cannot seek to a negative position")
        })?;

        if self.md5.take().is_some() {
            debug!(path = %self.file.path(), "seek disables content MD5");
        }
        self.buffer_start = target;
        Ok(target)
    }

    /// Upload the partial buffer.
    pub async fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.flush_buffer().await
    }

    /// Flush and finalize. Further calls other than `close` fail.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_buffer().await?;

        if let Some(md5) = self.md5.take() {
            if self.buffer_start == self.length {
                self.file.properties.content_md5 = Some(STANDARD.encode(md5.compute().0));
                self.file.set_properties().await?;
            } else {
                debug!(path = %self.file.path(), "writes did not cover the file; content MD5 not stored");
            }
        }

        self.closed = true;
        info!(path = %self.file.path(), length = self.length, "closed write stream");
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(FileShareError::invalid_argument("Write stream is closed"));
        }
        Ok(())
    }

    async fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let count = self.buffer.len() as u64;
        let end = self.buffer_start + count;
        if end > self.length {
            self.file.resize(end).await?;
            self.length = end;
        }

        let template = RequestTemplate::new(Method::PUT)
            .query("comp", "range")
            .header(X_MS_RANGE, range_header(self.buffer_start, count))?
            .header(X_MS_WRITE, "update")?
            .body(Bytes::copy_from_slice(&self.buffer));
        let response = self.file.send(&template).await?;
        self.file.record_write(&response.headers);

        debug!(path = %self.file.path(), offset = self.buffer_start, count, "uploaded range");
        self.buffer_start = end;
        self.buffer.clear();
        Ok(())
    }
}

impl std::fmt::Debug for FileWriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriteStream")
            .field("path", &self.file.path())
            .field("length", &self.length)
            .field("position", &self.position())
            .field("buffered", &self.buffer.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for FileWriteStream {
    fn drop(&mut self) {
        if !self.closed && !self.buffer.is_empty() {
            warn!(
                path = %self.file.path(),
                unflushed = self.buffer.len(),
                "write stream dropped with unflushed data"
            );
        }
    }
}
