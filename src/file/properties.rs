//! Cached properties of shares, directories and files.
//!
//! Populated from response headers by explicit fetches only.

use crate::transport::headers::*;
use crate::utils::datetime::parse_rfc1123;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap};
use serde::Serialize;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    header(headers, name).map(str::to_string)
}

fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    header(headers, header::LAST_MODIFIED.as_str()).and_then(|v| parse_rfc1123(v).ok())
}

fn server_encrypted(headers: &HeaderMap) -> bool {
    header(headers, X_MS_SERVER_ENCRYPTED)
        .or_else(|| header(headers, X_MS_REQUEST_SERVER_ENCRYPTED))
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShareProperties {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub quota_gib: Option<u32>,
}

impl ShareProperties {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: header_string(headers, header::ETAG.as_str()),
            last_modified: last_modified(headers),
            quota_gib: header(headers, X_MS_SHARE_QUOTA).and_then(|v| v.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryProperties {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_server_encrypted: bool,
}

impl DirectoryProperties {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: header_string(headers, header::ETAG.as_str()),
            last_modified: last_modified(headers),
            is_server_encrypted: server_encrypted(headers),
        }
    }
}

/// Standard HTTP content headers a file carries.
///
/// `set_properties` replaces all five at once; a `None` clears the value on
/// the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentSettings {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
}

impl ContentSettings {
    pub(crate) fn header_pairs(&self) -> [(&'static str, Option<&str>); 5] {
        [
            (X_MS_CONTENT_TYPE, self.content_type.as_deref()),
            (X_MS_CONTENT_ENCODING, self.content_encoding.as_deref()),
            (X_MS_CONTENT_LANGUAGE, self.content_language.as_deref()),
            (X_MS_CONTENT_DISPOSITION, self.content_disposition.as_deref()),
            (X_MS_CACHE_CONTROL, self.cache_control.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileProperties {
    pub content_length: u64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub content: ContentSettings,
    /// Base64 MD5 of the whole file, when one has been stored.
    pub content_md5: Option<String>,
    pub is_server_encrypted: bool,
}

impl FileProperties {
    /// Properties from a HEAD (or full GET) response.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut props = Self::from_common_headers(headers);
        props.content_length = header(headers, header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        props
    }

    /// Properties from a ranged GET: the length comes from `Content-Range`.
    pub fn from_range_headers(headers: &HeaderMap) -> Self {
        let mut props = Self::from_common_headers(headers);
        props.content_length = header(headers, header::CONTENT_RANGE.as_str())
            .and_then(total_from_content_range)
            .unwrap_or(0);
        // The Content-MD5 of a range response covers the range only
        props.content_md5 = None;
        props
    }

    fn from_common_headers(headers: &HeaderMap) -> Self {
        Self {
            content_length: 0,
            etag: header_string(headers, header::ETAG.as_str()),
            last_modified: last_modified(headers),
            content: ContentSettings {
                content_type: header_string(headers, header::CONTENT_TYPE.as_str()),
                content_encoding: header_string(headers, header::CONTENT_ENCODING.as_str()),
                content_language: header_string(headers, header::CONTENT_LANGUAGE.as_str()),
                content_disposition: header_string(headers, header::CONTENT_DISPOSITION.as_str()),
                cache_control: header_string(headers, header::CACHE_CONTROL.as_str()),
            },
            content_md5: header_string(headers, "content-md5"),
            is_server_encrypted: server_encrypted(headers),
        }
    }
}

/// Total length from a `Content-Range: bytes a-b/total` value.
pub(crate) fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.trim().parse().ok())
}
