//! Start, poll and abort server-side copies into a destination file.
//!
//! The cached [`CopyState`] of a handle is written by a successful
//! `start_copy` and by `fetch_attributes`, never by a failed call and never
//! by a local timer.

use crate::copy::state::{CopyState, CopyStatus};
use crate::error::{FileShareError, Result};
use crate::file::client::RequestTemplate;
use crate::file::FileClient;
use crate::transport::headers::{X_MS_COPY_ACTION, X_MS_COPY_ID, X_MS_COPY_SOURCE, X_MS_COPY_STATUS};
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

impl FileClient {
    /// Start copying `source` into this file and return the copy id.
    ///
    /// `source` may carry its own token. When the handle holds metadata it
    /// is sent and becomes the destination's metadata verbatim; otherwise
    /// the service copies the source's metadata.
    pub async fn start_copy(&mut self, source: &Url) -> Result<String> {
        let mut template = RequestTemplate::new(Method::PUT).header(X_MS_COPY_SOURCE, source.as_str())?;
        if !self.metadata.is_empty() {
            self.metadata.apply_to(&mut template)?;
        }

        let response = self.send(&template).await?;
        let copy_id = response
            .header_str(X_MS_COPY_ID)
            .ok_or_else(|| FileShareError::serialization("Copy response carries no copy id"))?
            .to_string();
        let status = response
            .header_str(X_MS_COPY_STATUS)
            .map(CopyStatus::parse)
            .transpose()?
            .unwrap_or(CopyStatus::Pending);

        self.record_write(&response.headers);
        self.copy_state = Some(CopyState {
            copy_id: copy_id.clone(),
            status,
            source: Some(strip_query(source)),
            total_bytes: None,
            bytes_copied: None,
            completion_time: None,
            status_description: None,
        });

        info!(path = %self.path(), %copy_id, %status, "started copy");
        Ok(copy_id)
    }

    /// Start copying another file of the same account into this one.
    pub async fn start_copy_from_file(&mut self, source: &FileClient) -> Result<String> {
        self.start_copy(&source.authorized_uri()).await
    }

    /// Abort the pending copy `copy_id`.
    ///
    /// Fails with `Conflict` (`NoPendingCopyOperation`) when the copy has
    /// already finished or `copy_id` is not the destination's pending copy.
    /// The cached copy state is left as is; fetch attributes to observe the
    /// aborted status.
    pub async fn abort_copy(&mut self, copy_id: &str) -> Result<()> {
        if copy_id.trim().is_empty() {
            return Err(FileShareError::invalid_argument("Copy id cannot be empty"));
        }

        let template = RequestTemplate::new(Method::PUT)
            .query("comp", "copy")
            .query("copyid", copy_id)
            .header(X_MS_COPY_ACTION, "abort")?;
        let response = self.send(&template).await?;
        self.record_write(&response.headers);

        info!(path = %self.path(), %copy_id, "aborted copy");
        Ok(())
    }

    /// Poll the destination every `poll_interval` until its copy reaches a
    /// terminal status, and return that state.
    pub async fn wait_for_copy(&mut self, poll_interval: Duration) -> Result<CopyState> {
        let mut last_status = None;
        loop {
            self.fetch_attributes().await?;
            let state = self.copy_state.clone().ok_or_else(|| {
                FileShareError::invalid_argument(format!(
                    "'{}' has no copy to wait for",
                    self.path()
                ))
            })?;

            if last_status != Some(state.status) {
                info!(path = %self.path(), copy_id = %state.copy_id, status = %state.status, "copy status");
                last_status = Some(state.status);
            }
            if state.status.is_terminal() {
                return Ok(state);
            }

            debug!(
                copied = ?state.bytes_copied,
                total = ?state.total_bytes,
                "copy pending"
            );
            tokio::time::sleep(poll_interval).await;
        }
    }
}

fn strip_query(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_source_drops_token() {
        let url = Url::parse("https://acct.file.core.windows.net/share/src?sv=2019-02-02&sig=secret").unwrap();
        assert_eq!(strip_query(&url), "https://acct.file.core.windows.net/share/src");
    }
}
