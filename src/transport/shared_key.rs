//! Shared-key request signing for account-key credentials.

use super::headers::{X_MS_DATE, X_MS_VERSION};
use super::StorageRequest;
use crate::auth::signing::sign_base64;
use crate::error::Result;
use crate::utils::datetime::to_rfc1123;
use chrono::Utc;
use reqwest::header::{
    AUTHORIZATION, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_TYPE, IF_MATCH,
    IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE, RANGE,
};
use std::collections::BTreeMap;

const CONTENT_MD5: &str = "content-md5";

/// Canonical string-to-sign of a request.
pub fn string_to_sign(request: &StorageRequest, account: &str) -> String {
    let header = |name: &str| request.header_str(name).unwrap_or_default().to_string();
    let content_length = match request.body.len() {
        0 => String::new(),
        n => n.to_string(),
    };

    let mut parts = vec![
        request.method.as_str().to_string(),
        header(CONTENT_ENCODING.as_str()),
        header(CONTENT_LANGUAGE.as_str()),
        content_length,
        header(CONTENT_MD5),
        header(CONTENT_TYPE.as_str()),
        // Date is always carried in x-ms-date
        String::new(),
        header(IF_MODIFIED_SINCE.as_str()),
        header(IF_MATCH.as_str()),
        header(IF_NONE_MATCH.as_str()),
        header(IF_UNMODIFIED_SINCE.as_str()),
        header(RANGE.as_str()),
    ];
    let headers = canonicalized_headers(request);
    if !headers.is_empty() {
        parts.push(headers);
    }
    parts.push(canonicalized_resource(request, account));
    parts.join("\n")
}

fn canonicalized_headers(request: &StorageRequest) -> String {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &request.headers {
        let name = name.as_str().to_ascii_lowercase();
        if name.starts_with("x-ms-") {
            let value = value.to_str().unwrap_or_default().trim().to_string();
            headers.insert(name, value);
        }
    }

    headers
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn canonicalized_resource(request: &StorageRequest, account: &str) -> String {
    let mut resource = format!("/{account}{}", request.url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in request.url.query_pairs() {
        params
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    for (name, mut values) in params {
        values.sort();
        resource.push_str(&format!("\n{name}:{}", values.join(",")));
    }

    resource
}

/// Stamp `x-ms-date` and add the `Authorization: SharedKey` header.
pub fn sign_request(request: &mut StorageRequest, account: &str, key: &[u8]) -> Result<()> {
    if request.header_str(X_MS_DATE).is_none() {
        request.set_header(X_MS_DATE, to_rfc1123(Utc::now()))?;
    }
    if request.header_str(X_MS_VERSION).is_none() {
        request.set_header(X_MS_VERSION, super::headers::SERVICE_VERSION)?;
    }

    let signature = sign_base64(key, &string_to_sign(request, account))?;
    request.set_header(
        AUTHORIZATION.as_str(),
        format!("SharedKey {account}:{signature}"),
    )
}

/// Split an `Authorization: SharedKey account:signature` value.
pub fn parse_authorization(value: &str) -> Option<(&str, &str)> {
    value.strip_prefix("SharedKey ")?.split_once(':')
}
