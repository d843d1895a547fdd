use crate::error::{FileShareError, Result};
use crate::transport::headers::*;
use crate::utils::datetime::{parse_rfc1123, to_rfc1123};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use std::fmt;

/// Status of a server-side copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl CopyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        match input.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "aborted" => Ok(Self::Aborted),
            "failed" => Ok(Self::Failed),
            other => Err(FileShareError::serialization(format!(
                "Unknown copy status '{other}'"
            ))),
        }
    }

    /// Success, Aborted and Failed never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy state of a destination file as the service last reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyState {
    pub copy_id: String,
    pub status: CopyStatus,
    /// Source URL, without its query string.
    pub source: Option<String>,
    pub total_bytes: Option<u64>,
    pub bytes_copied: Option<u64>,
    /// Set only once the status is terminal.
    pub completion_time: Option<DateTime<Utc>>,
    pub status_description: Option<String>,
}

impl CopyState {
    /// Copy state carried by a response, or `None` when the file was never
    /// a copy destination.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>> {
        let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let (Some(copy_id), Some(status)) = (get(X_MS_COPY_ID), get(X_MS_COPY_STATUS)) else {
            return Ok(None);
        };
        let status = CopyStatus::parse(status)?;

        let (bytes_copied, total_bytes) = match get(X_MS_COPY_PROGRESS) {
            Some(progress) => {
                let (copied, total) = parse_progress(progress)?;
                (Some(copied), Some(total))
            }
            None => (None, None),
        };

        let completion_time = if status.is_terminal() {
            get(X_MS_COPY_COMPLETION_TIME)
                .map(parse_rfc1123)
                .transpose()?
        } else {
            None
        };

        Ok(Some(Self {
            copy_id: copy_id.to_string(),
            status,
            source: get(X_MS_COPY_SOURCE).map(str::to_string),
            total_bytes,
            bytes_copied,
            completion_time,
            status_description: get(X_MS_COPY_STATUS_DESCRIPTION)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        }))
    }

    /// Write the state as `x-ms-copy-*` response headers.
    pub fn write_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        let mut put = |name: &'static str, value: String| -> Result<()> {
            let value = HeaderValue::from_str(&value).map_err(|e| {
                FileShareError::serialization(format!("Invalid value for '{name}': {e}"))
            })?;
            headers.insert(name, value);
            Ok(())
        };

        put(X_MS_COPY_ID, self.copy_id.clone())?;
        put(X_MS_COPY_STATUS, self.status.as_str().to_string())?;
        if let Some(source) = &self.source {
            put(X_MS_COPY_SOURCE, source.clone())?;
        }
        if let (Some(copied), Some(total)) = (self.bytes_copied, self.total_bytes) {
            put(X_MS_COPY_PROGRESS, format!("{copied}/{total}"))?;
        }
        if let Some(time) = self.completion_time {
            put(X_MS_COPY_COMPLETION_TIME, to_rfc1123(time))?;
        }
        if let Some(description) = &self.status_description {
            put(X_MS_COPY_STATUS_DESCRIPTION, description.clone())?;
        }
        Ok(())
    }
}

/// Parse `x-ms-copy-progress` (`"{copied}/{total}"`).
pub fn parse_progress(value: &str) -> Result<(u64, u64)> {
    let invalid = || FileShareError::serialization(format!("Invalid copy progress '{value}'"));
    let (copied, total) = value.split_once('/').ok_or_else(invalid)?;
    let copied = copied.trim().parse().map_err(|_| invalid())?;
    let total = total.trim().parse().map_err(|_| invalid())?;
    Ok((copied, total))
}
