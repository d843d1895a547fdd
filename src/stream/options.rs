use crate::error::{FileShareError, Result};
use crate::file::client::MAX_RANGE_SIZE;

/// Options for [`crate::file::FileClient::open_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReadOptions {
    /// Fetch attributes (and pin the ETag) when the stream opens. When
    /// false, the ETag is pinned by the first call that reaches the service.
    pub prefetch_attributes: bool,
    /// Smallest range a fetch asks for; defaults to the client's setting.
    pub minimum_read_size: Option<usize>,
}

impl Default for OpenReadOptions {
    fn default() -> Self {
        Self {
            prefetch_attributes: true,
            minimum_read_size: None,
        }
    }
}

impl OpenReadOptions {
    pub(crate) fn resolve_minimum_read_size(&self, client_default: usize) -> Result<usize> {
        match self.minimum_read_size.unwrap_or(client_default) {
            0 => Err(FileShareError::invalid_argument(
                "minimum_read_size must be greater than zero",
            )),
            size => Ok(size),
        }
    }
}

/// Options for [`crate::file::FileClient::open_write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenWriteOptions {
    /// Store the MD5 of the content as the file's `Content-MD5` on close.
    /// Only honoured while writes run sequentially from offset 0 and cover
    /// the whole file; any seek turns it off.
    pub store_content_md5: bool,
    /// Bytes buffered per range upload; defaults to the client's setting.
    pub stream_write_size: Option<usize>,
}

impl OpenWriteOptions {
    pub(crate) fn resolve_write_size(&self, client_default: usize) -> Result<usize> {
        let size = self.stream_write_size.unwrap_or(client_default);
        if size == 0 || size > MAX_RANGE_SIZE {
            return Err(FileShareError::invalid_argument(format!(
                "stream_write_size must be between 1 and {MAX_RANGE_SIZE} bytes"
            )));
        }
        Ok(size)
    }
}
