use crate::error::{FileShareError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Which endpoint(s) requests may be sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationMode {
    #[default]
    PrimaryOnly,
    PrimaryThenSecondary,
    SecondaryOnly,
}

/// Primary URI of a resource plus its geo-redundant secondary, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUri {
    pub primary: Url,
    pub secondary: Option<Url>,
}

impl StorageUri {
    pub fn new(primary: Url) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(primary: Url, secondary: Url) -> Self {
        Self {
            primary,
            secondary: Some(secondary),
        }
    }

    /// Append `/`-separated path segments to both locations.
    pub fn join(&self, path: &str) -> Result<Self> {
        Ok(Self {
            primary: append_segments(&self.primary, path)?,
            secondary: self
                .secondary
                .as_ref()
                .map(|url| append_segments(url, path))
                .transpose()?,
        })
    }

    /// Pick the URL for a request.
    ///
    /// Writes always go to the primary. Reads follow `mode`; with
    /// `PrimaryThenSecondary` successive retry attempts alternate.
    pub fn select(&self, mode: LocationMode, is_read: bool, attempt: usize) -> Result<&Url> {
        if !is_read {
            return Ok(&self.primary);
        }

        match (mode, &self.secondary) {
            (LocationMode::PrimaryOnly, _) => Ok(&self.primary),
            (LocationMode::PrimaryThenSecondary, Some(secondary)) if attempt % 2 == 1 => {
                Ok(secondary)
            }
            (LocationMode::PrimaryThenSecondary, _) => Ok(&self.primary),
            (LocationMode::SecondaryOnly, Some(secondary)) => Ok(secondary),
            (LocationMode::SecondaryOnly, None) => Err(FileShareError::invalid_argument(
                "Location mode SecondaryOnly requires a secondary endpoint",
            )),
        }
    }
}

fn append_segments(base: &Url, path: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| FileShareError::invalid_argument(format!("'{base}' cannot be a base URL")))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}
