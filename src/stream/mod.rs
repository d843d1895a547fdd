//! Remote streams over ranged requests
//!
//! [`FileReadStream`] and [`FileWriteStream`] are separate types: a stream
//! opened for reading has no write operation and the reverse, so using the
//! wrong one does not compile.
//!
//! ```compile_fail
//! # async fn demo(file: fileshare::file::FileClient) -> fileshare::Result<()> {
//! let mut stream = file.open_read(Default::default()).await?;
//! stream.write(b"not allowed").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ```compile_fail
//! # async fn demo(file: fileshare::file::FileClient) -> fileshare::Result<()> {
//! let mut stream = file.open_write(None, Default::default()).await?;
//! let mut buf = [0u8; 16];
//! stream.read(&mut buf).await?;
//! # Ok(())
//! # }
//! ```

pub mod options;
pub mod read;
pub mod write;

pub use options::{OpenReadOptions, OpenWriteOptions};
pub use read::FileReadStream;
pub use write::FileWriteStream;
