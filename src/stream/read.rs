use crate::error::{FileShareError, Result};
use crate::file::client::RequestTemplate;
use crate::file::file::range_header;
use crate::file::properties::FileProperties;
use crate::file::FileClient;
use crate::stream::options::OpenReadOptions;
use crate::transport::headers::X_MS_RANGE;
use bytes::Bytes;
use reqwest::header::IF_MATCH;
use reqwest::Method;
use std::io::SeekFrom;
use tracing::{debug, warn};

const READ_CHUNK: usize = 64 * 1024;

/// Seekable reader over a remote file.
///
/// Reads are served from one contiguous buffer; a miss fetches
/// `max(requested, minimum_read_size)` bytes at the current position. Every
/// fetch after the ETag is pinned carries `If-Match`, so the stream never
/// mixes bytes from two versions of the file. A `412` ends the stream: that
/// read and every later one fail with `PreconditionFailed`.
#[derive(Debug)]
pub struct FileReadStream {
    file: FileClient,
    pinned_etag: Option<String>,
    length: Option<u64>,
    position: u64,
    buffer: Bytes,
    buffer_offset: u64,
    minimum_read_size: usize,
    faulted: Option<(String, String)>,
}

impl FileReadStream {
    pub(crate) async fn open(mut file: FileClient, options: OpenReadOptions) -> Result<Self> {
        let minimum_read_size =
            options.resolve_minimum_read_size(file.service().options().minimum_read_size)?;

        let (pinned_etag, length) = if options.prefetch_attributes {
            file.fetch_attributes().await?;
            (file.properties.etag.clone(), Some(file.properties.content_length))
        } else {
            (None, None)
        };

        debug!(path = %file.path(), etag = ?pinned_etag, ?length, "opened read stream");
        Ok(Self {
            file,
            pinned_etag,
            length,
            position: 0,
            buffer: Bytes::new(),
            buffer_offset: 0,
            minimum_read_size,
            faulted: None,
        })
    }

    pub fn file(&self) -> &FileClient {
        &self.file
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// ETag every range fetch is conditioned on, once pinned.
    pub fn etag(&self) -> Option<&str> {
        self.pinned_etag.as_deref()
    }

    /// Length of the file version the stream is pinned to.
    pub async fn length(&mut self) -> Result<u64> {
        if let Some(length) = self.length {
            return Ok(length);
        }
        self.check_faulted()?;

        self.file.fetch_attributes().await?;
        self.pinned_etag = self.file.properties.etag.clone();
        self.length = Some(self.file.properties.content_length);
        Ok(self.file.properties.content_length)
    }

    /// Move the read position. Seeking past the end is allowed; reads there
    /// return 0 bytes.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length().await?.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            FileShareError::invalid_argument("Cannot seek to a negative position")
        })?;
        self.position = target;
        Ok(target)
    }

    /// Read into `buf`, returning the number of bytes read; 0 at or past the end.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_faulted()?;
        if buf.is_empty() || self.at_end() {
            return Ok(0);
        }

        if !self.buffer_covers(self.position) && !self.fill(buf.len()).await? {
            return Ok(0);
        }

        let start = (self.position - self.buffer_offset) as usize;
        let count = buf.len().min(self.buffer.len() - start);
        buf[..count].copy_from_slice(&self.buffer[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }

    /// Read everything from the current position to the end.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            let read = self.read(&mut chunk).await?;
            if read == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..read]);
            total += read;
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.length, Some(length) if self.position >= length)
    }

    fn buffer_covers(&self, position: u64) -> bool {
        position >= self.buffer_offset && position < self.buffer_offset + self.buffer.len() as u64
    }

    fn check_faulted(&self) -> Result<()> {
        match &self.faulted {
            Some((code, message)) => Err(FileShareError::PreconditionFailed {
                code: code.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Fetch the range starting at the current position. Returns false when
    /// the service reports nothing there.
    async fn fill(&mut self, requested: usize) -> Result<bool> {
        let mut count = requested.max(self.minimum_read_size) as u64;
        if let Some(length) = self.length {
            count = count.min(length - self.position);
        }
        // The range must end inside u64 even when the length is unknown
        count = count.min(u64::MAX - self.position);
        if count == 0 {
            return Ok(false);
        }

        let mut template = RequestTemplate::new(Method::GET)
            .header(X_MS_RANGE, range_header(self.position, count))?;
        if let Some(etag) = &self.pinned_etag {
            template.set_header(IF_MATCH.as_str(), etag)?;
        }

        let response = match self.file.send(&template).await {
            Ok(response) => response,
            Err(FileShareError::PreconditionFailed { code, message }) => {
                warn!(path = %self.file.path(), etag = ?self.pinned_etag, "file changed under read stream");
                self.faulted = Some((code.clone(), message.clone()));
                return Err(FileShareError::PreconditionFailed { code, message });
            }
            Err(e) if e.status() == Some(416) => return Ok(false),
            Err(e) => return Err(e),
        };

        if self.pinned_etag.is_none() {
            let props = FileProperties::from_range_headers(&response.headers);
            self.pinned_etag = props.etag.clone();
            self.length = Some(props.content_length);
            self.file.properties = props;
        }

        debug!(
            path = %self.file.path(),
            offset = self.position,
            requested = count,
            received = response.body.len(),
            "fetched range"
        );
        self.buffer_offset = self.position;
        self.buffer = response.body;
        Ok(!self.buffer.is_empty())
    }
}
