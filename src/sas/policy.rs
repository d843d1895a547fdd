//! Inputs to token minting: the access policy and its optional restrictions.

use super::permissions::SharedAccessPermissions;
use crate::error::{FileShareError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Time window and permission set of a shared access signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedAccessPolicy {
    pub start: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub permissions: SharedAccessPermissions,
}

impl SharedAccessPolicy {
    pub fn new(permissions: SharedAccessPermissions, expiry: DateTime<Utc>) -> Self {
        Self {
            start: None,
            expiry: Some(expiry),
            permissions,
        }
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Local validation performed before any token is minted.
    pub fn validate(&self) -> Result<()> {
        if self.permissions.is_empty() {
            return Err(FileShareError::invalid_argument(
                "Shared access policy must grant at least one permission",
            ));
        }

        let expiry = self.expiry.ok_or_else(|| {
            FileShareError::invalid_argument("Shared access policy requires an expiry time")
        })?;

        if let Some(start) = self.start {
            if expiry <= start {
                return Err(FileShareError::invalid_argument(format!(
                    "Expiry time {expiry} must be later than start time {start}"
                )));
            }
        }

        Ok(())
    }
}

/// Response header overrides carried in the token (`rscc`, `rscd`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedAccessHeaders {
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: Option<String>,
}

impl SharedAccessHeaders {
    pub fn is_empty(&self) -> bool {
        self.cache_control.is_none()
            && self.content_disposition.is_none()
            && self.content_encoding.is_none()
            && self.content_language.is_none()
            && self.content_type.is_none()
    }
}

/// Protocols a token may be used over (`spr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharedAccessProtocol {
    HttpsOnly,
    HttpsOrHttp,
}

impl SharedAccessProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpsOnly => "https",
            Self::HttpsOrHttp => "https,http",
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "https" => Ok(Self::HttpsOnly),
            "https,http" => Ok(Self::HttpsOrHttp),
            other => Err(FileShareError::invalid_argument(format!(
                "Unknown signed protocol '{other}'"
            ))),
        }
    }

    /// Whether a request over `scheme` is allowed.
    pub fn allows(self, scheme: &str) -> bool {
        match self {
            Self::HttpsOnly => scheme.eq_ignore_ascii_case("https"),
            Self::HttpsOrHttp => {
                scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("http")
            }
        }
    }
}

/// A single IPv4 address or an inclusive range (`sip`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpAddressOrRange {
    start: Ipv4Addr,
    end: Option<Ipv4Addr>,
}

impl IpAddressOrRange {
    pub fn single(address: Ipv4Addr) -> Self {
        Self {
            start: address,
            end: None,
        }
    }

    pub fn range(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        let range = Self {
            start,
            end: Some(end),
        };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        match self.end {
            Some(end) if u32::from(self.start) > u32::from(end) => {
                Err(FileShareError::invalid_argument(format!(
                    "IP range lower bound {} is greater than upper bound {end}",
                    self.start
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        let value = u32::from(address);
        let start = u32::from(self.start);
        let end = self.end.map(u32::from).unwrap_or(start);
        start <= value && value <= end
    }
}

impl fmt::Display for IpAddressOrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{end}", self.start),
            None => write!(f, "{}", self.start),
        }
    }
}

impl FromStr for IpAddressOrRange {
    type Err = FileShareError;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim().parse::<Ipv4Addr>().map_err(|e| {
                FileShareError::invalid_argument(format!("Invalid IPv4 address '{part}': {e}"))
            })
        };

        match s.split_once('-') {
            Some((start, end)) => Self::range(parse(start)?, parse(end)?),
            None => Ok(Self::single(parse(s)?)),
        }
    }
}

/// What a token is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SasResource {
    Share {
        account: String,
        share: String,
    },
    File {
        account: String,
        share: String,
        path: String,
    },
}

impl SasResource {
    /// Value of the `sr` field.
    pub fn signed_resource(&self) -> &'static str {
        match self {
            Self::Share { .. } => "s",
            Self::File { .. } => "f",
        }
    }

    /// Canonicalized resource used in the string-to-sign.
    pub fn canonical(&self) -> String {
        match self {
            Self::Share { account, share } => format!("/file/{account}/{share}"),
            Self::File {
                account,
                share,
                path,
            } => format!("/file/{account}/{share}/{}", path.trim_start_matches('/')),
        }
    }
}
