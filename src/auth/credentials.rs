//! Storage credentials and the URI/request transform they apply.

use crate::auth::signing::decode_account_key;
use crate::error::{FileShareError, Result};
use crate::file::uri::StorageUri;
use crate::sas::SharedAccessSignatureBuilder;
use crate::transport::shared_key::sign_request;
use crate::transport::StorageRequest;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use url::{form_urlencoded, Url};
use zeroize::Zeroizing;

/// Which kind of credential a [`StorageCredentials`] currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    Anonymous,
    SharedAccessSignature,
    AccountKey,
}

enum CredentialKind {
    Anonymous,
    SharedAccessSignature(String),
    AccountKey {
        account: String,
        key: Zeroizing<Vec<u8>>,
    },
}

/// Credentials shared by every handle created from the same client.
///
/// Clones point at the same cell, so [`StorageCredentials::update_sas_token`]
/// re-authorizes all of them at once.
#[derive(Clone)]
pub struct StorageCredentials {
    inner: Arc<RwLock<CredentialKind>>,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("StorageCredentials");
        ds.field("mode", &self.mode());
        if let Some(account) = self.account_name() {
            ds.field("account", &account);
        }
        ds.finish_non_exhaustive()
    }
}

impl StorageCredentials {
    fn from_kind(kind: CredentialKind) -> Self {
        Self {
            inner: Arc::new(RwLock::new(kind)),
        }
    }

    pub fn anonymous() -> Self {
        Self::from_kind(CredentialKind::Anonymous)
    }

    /// Token credentials. A leading `?` is accepted and dropped.
    pub fn sas(token: impl Into<String>) -> Self {
        Self::from_kind(CredentialKind::SharedAccessSignature(normalize_token(token.into())))
    }

    /// Account-key credentials; `key` is the base64 account key.
    pub fn account_key(account: impl Into<String>, key: &str) -> Result<Self> {
        let account = account.into();
        if account.trim().is_empty() {
            return Err(FileShareError::invalid_argument("Account name cannot be empty"));
        }
        Ok(Self::from_kind(CredentialKind::AccountKey {
            account,
            key: decode_account_key(key)?,
        }))
    }

    pub fn mode(&self) -> CredentialMode {
        match &*self.inner.read() {
            CredentialKind::Anonymous => CredentialMode::Anonymous,
            CredentialKind::SharedAccessSignature(_) => CredentialMode::SharedAccessSignature,
            CredentialKind::AccountKey { .. } => CredentialMode::AccountKey,
        }
    }

    pub fn sas_token(&self) -> Option<String> {
        match &*self.inner.read() {
            CredentialKind::SharedAccessSignature(token) => Some(token.clone()),
            _ => None,
        }
    }

    pub fn account_name(&self) -> Option<String> {
        match &*self.inner.read() {
            CredentialKind::AccountKey { account, .. } => Some(account.clone()),
            _ => None,
        }
    }

    /// Swap the token in place.
    ///
    /// Fails unless these credentials already hold a token: a handle cannot
    /// be switched between credential modes.
    pub fn update_sas_token(&self, token: impl Into<String>) -> Result<()> {
        let mut guard = self.inner.write();
        match &mut *guard {
            CredentialKind::SharedAccessSignature(current) => {
                *current = normalize_token(token.into());
                Ok(())
            }
            _ => Err(FileShareError::invalid_argument(
                "Cannot update the SAS token of credentials that are not SAS credentials",
            )),
        }
    }

    /// Mint a token with the account key held by these credentials.
    pub fn sign(&self, builder: &SharedAccessSignatureBuilder) -> Result<String> {
        match &*self.inner.read() {
            CredentialKind::AccountKey { key, .. } => {
                Ok(builder.sign_with_key(key.as_slice())?.to_query())
            }
            _ => Err(FileShareError::invalid_argument(
                "Minting a shared access signature requires account-key credentials",
            )),
        }
    }

    /// Authorized form of `url`.
    ///
    /// With a token, its query pairs are appended (pairs already present on
    /// the URL are left alone). Anonymous and account-key credentials pass
    /// the URL through; account-key requests are signed in [`Self::authorize`].
    pub fn transform_uri(&self, url: &Url) -> Url {
        match &*self.inner.read() {
            CredentialKind::SharedAccessSignature(token) => append_token(url, token),
            _ => url.clone(),
        }
    }

    /// Apply [`Self::transform_uri`] to both locations with the same token.
    pub fn transform_storage_uri(&self, uri: &StorageUri) -> StorageUri {
        StorageUri {
            primary: self.transform_uri(&uri.primary),
            secondary: uri.secondary.as_ref().map(|url| self.transform_uri(url)),
        }
    }

    /// Authorize an outgoing request.
    pub fn authorize(&self, request: &mut StorageRequest) -> Result<()> {
        match &*self.inner.read() {
            CredentialKind::Anonymous => Ok(()),
            CredentialKind::SharedAccessSignature(token) => {
                request.url = append_token(&request.url, token);
                Ok(())
            }
            CredentialKind::AccountKey { account, key } => {
                sign_request(request, account, key.as_slice())
            }
        }
    }
}

fn normalize_token(token: String) -> String {
    token.trim().trim_start_matches('?').to_string()
}

fn append_token(url: &Url, token: &str) -> Url {
    let existing: Vec<String> = url.query_pairs().map(|(name, _)| name.into_owned()).collect();
    let mut query: Vec<&str> = url.query().into_iter().filter(|q| !q.is_empty()).collect();

    // Token pairs are copied as written so their encoding survives
    for segment in token.split('&').filter(|s| !s.is_empty()) {
        let name = form_urlencoded::parse(segment.as_bytes())
            .next()
            .map(|(name, _)| name.into_owned())
            .unwrap_or_default();
        if !existing.contains(&name) {
            query.push(segment);
        }
    }

    let mut url = url.clone();
    if query.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&query.join("&")));
    }
    url
}
