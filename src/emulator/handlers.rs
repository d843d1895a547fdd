//! Routing and per-operation handlers of the emulated service.

use super::authorize::{Authorizer, Principal};
use super::state::{parent_of, CopyRecord, DirectoryEntry, FileEntry, ServiceState, ShareEntry, Stamp};
use super::CopyCompletion;
use crate::copy::{CopyState, CopyStatus};
use crate::file::{ContentSettings, Metadata};
use crate::sas::{SharedAccessHeaders, SharedAccessPermissions};
use crate::transport::headers::*;
use crate::transport::{StorageRequest, StorageResponse};
use crate::utils::datetime::to_rfc1123;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use quick_xml::escape::escape;
use reqwest::header::{self, HeaderValue, IF_MATCH};
use reqwest::{Method, StatusCode};
use tracing::warn;
use url::Url;

type Outcome = Result<StorageResponse, Box<StorageResponse>>;

/// What a request addresses below the share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scope {
    Share,
    Directory(String),
    File(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Route {
    pub share: String,
    pub scope: Scope,
    pub secondary: bool,
}

impl Route {
    /// Route of `url` on `account`'s endpoints, or `None` for another host.
    pub fn parse(account: &str, url: &Url) -> Result<Option<Self>, Box<StorageResponse>> {
        let host = url.host_str().unwrap_or_default();
        let secondary = match host.split_once('.') {
            Some((label, _)) if label == account => false,
            Some((label, _)) if label == format!("{account}-secondary") => true,
            _ => return Ok(None),
        };

        let mut segments = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned());
        let Some(share) = segments.next() else {
            return Err(fail(StatusCode::BAD_REQUEST, "InvalidUri", "The requested URI does not represent any resource on the server."));
        };
        let path = segments.collect::<Vec<_>>().join("/");

        let restype = query_value(url, "restype");
        let scope = match (restype.as_deref(), path.is_empty()) {
            (Some("share"), true) => Scope::Share,
            (Some("directory"), _) => Scope::Directory(path),
            (None, false) => Scope::File(path),
            _ => {
                return Err(fail(
                    StatusCode::BAD_REQUEST,
                    "InvalidQueryParameterValue",
                    "Value for one of the query parameters specified in the request URI is invalid.",
                ))
            }
        };

        Ok(Some(Self {
            share,
            scope,
            secondary,
        }))
    }
}

pub(crate) struct Context<'a> {
    pub account: &'a str,
    pub authorizer: Authorizer<'a>,
    pub copy_completion: CopyCompletion,
    pub list_page_size: usize,
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> StorageResponse {
    let mut response = StorageResponse::new(status);
    set(&mut response, X_MS_ERROR_CODE, code);
    set(&mut response, header::CONTENT_TYPE.as_str(), "application/xml");
    response.body = Bytes::from(format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
        escape(code),
        escape(message)
    ));
    response
}

fn fail(status: StatusCode, code: &str, message: &str) -> Box<StorageResponse> {
    Box::new(error_response(status, code, message))
}

fn set(response: &mut StorageResponse, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers.insert(name, value);
    }
}

fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.into_owned())
}

fn missing_header(name: &str) -> Box<StorageResponse> {
    fail(
        StatusCode::BAD_REQUEST,
        "MissingRequiredHeader",
        &format!("An HTTP header that's mandatory for this request is not specified: {name}"),
    )
}

fn invalid_header(name: &str) -> Box<StorageResponse> {
    fail(
        StatusCode::BAD_REQUEST,
        "InvalidHeaderValue",
        &format!("The value for the HTTP header '{name}' is not in the correct format."),
    )
}

fn share_not_found() -> Box<StorageResponse> {
    fail(StatusCode::NOT_FOUND, "ShareNotFound", "The specified share does not exist.")
}

fn resource_not_found() -> Box<StorageResponse> {
    fail(StatusCode::NOT_FOUND, "ResourceNotFound", "The specified resource does not exist.")
}

fn parent_not_found() -> Box<StorageResponse> {
    fail(StatusCode::NOT_FOUND, "ParentNotFound", "The specified parent path does not exist.")
}

fn stamped(status: StatusCode, stamp: &Stamp) -> StorageResponse {
    let mut response = StorageResponse::new(status);
    set(&mut response, header::ETAG.as_str(), &stamp.etag);
    set(&mut response, header::LAST_MODIFIED.as_str(), &to_rfc1123(stamp.last_modified));
    response
}

fn write_metadata(response: &mut StorageResponse, metadata: &Metadata) {
    for (key, value) in metadata.iter() {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::from_bytes(format!("{X_MS_META_PREFIX}{key}").as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response.headers.insert(name, value);
        }
    }
}

fn content_settings_from(request: &StorageRequest) -> ContentSettings {
    let get = |name: &str| request.header_str(name).map(str::to_string);
    ContentSettings {
        content_type: get(X_MS_CONTENT_TYPE),
        content_encoding: get(X_MS_CONTENT_ENCODING),
        content_language: get(X_MS_CONTENT_LANGUAGE),
        content_disposition: get(X_MS_CONTENT_DISPOSITION),
        cache_control: get(X_MS_CACHE_CONTROL),
    }
}

/// Parse `bytes=a-b` (or `bytes=a-`).
fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let (start, end) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() { None } else { Some(end.parse().ok()?) };
    if end.is_some_and(|end| end < start) {
        return None;
    }
    Some((start, end))
}

fn check_if_match(request: &StorageRequest, stamp: &Stamp) -> Result<(), Box<StorageResponse>> {
    match request.header_str(IF_MATCH.as_str()) {
        Some(condition) if condition != "*" && condition != stamp.etag => Err(fail(
            StatusCode::PRECONDITION_FAILED,
            "ConditionNotMet",
            "The condition specified using HTTP conditional header(s) is not met.",
        )),
        _ => Ok(()),
    }
}

fn required_access(method: &Method, scope: &Scope, comp: Option<&str>) -> SharedAccessPermissions {
    match (method, scope, comp) {
        (&Method::GET, Scope::Directory(_), Some("list")) => SharedAccessPermissions::LIST,
        (&Method::GET | &Method::HEAD, _, _) => SharedAccessPermissions::READ,
        (&Method::DELETE, _, _) => SharedAccessPermissions::DELETE,
        (&Method::PUT, Scope::Share | Scope::Directory(_), _) => SharedAccessPermissions::CREATE,
        (&Method::PUT, Scope::File(_), None) => SharedAccessPermissions::CREATE,
        _ => SharedAccessPermissions::WRITE,
    }
}

/// Answer one request against `state`.
pub(crate) fn handle(state: &mut ServiceState, ctx: &Context<'_>, request: &StorageRequest) -> StorageResponse {
    dispatch(state, ctx, request).unwrap_or_else(|response| *response)
}

fn dispatch(state: &mut ServiceState, ctx: &Context<'_>, request: &StorageRequest) -> Outcome {
    let route = Route::parse(ctx.account, &request.url)?.ok_or_else(|| {
        fail(StatusCode::BAD_REQUEST, "InvalidUri", "The request host is not this account.")
    })?;
    let comp = query_value(&request.url, "comp");
    let is_read = request.method == Method::GET || request.method == Method::HEAD;

    if route.secondary && !is_read {
        return Err(fail(
            StatusCode::FORBIDDEN,
            "WriteOperationNotSupportedOnSecondary",
            "Write operations are not allowed on the secondary location.",
        ));
    }

    let is_copy = request.header_str(X_MS_COPY_SOURCE).is_some();
    let required = if is_copy {
        SharedAccessPermissions::WRITE
    } else {
        required_access(&request.method, &route.scope, comp.as_deref())
    };
    let principal = ctx.authorizer.authorize(request, &route, required)?;

    let method = request.method.clone();
    match (&route.scope, comp.as_deref()) {
        (Scope::Share, None) => {
            if !matches!(principal, Principal::SharedKey) && !is_read {
                return Err(fail(
                    StatusCode::FORBIDDEN,
                    "AuthorizationResourceTypeMismatch",
                    "This request is not authorized to perform this operation using this resource type.",
                ));
            }
            match method {
                Method::PUT => create_share(state, &route, request),
                Method::DELETE => delete_share(state, &route),
                Method::GET | Method::HEAD => share_properties(state, &route),
                _ => Err(unsupported()),
            }
        }
        (Scope::Directory(path), None) => match method {
            Method::PUT => create_directory(state, &route, path, request),
            Method::DELETE => delete_directory(state, &route, path),
            Method::GET | Method::HEAD => directory_properties(state, &route, path),
            _ => Err(unsupported()),
        },
        (Scope::Directory(path), Some("list")) if method == Method::GET => {
            list_directory(state, ctx, &route, path, request)
        }
        (Scope::File(path), None) => match method {
            Method::PUT if is_copy => start_copy(state, ctx, &route, path, request, &principal),
            Method::PUT => create_file(state, &route, path, request),
            Method::GET => get_file(state, &route, path, request, &principal),
            Method::HEAD => head_file(state, &route, path, request, &principal),
            Method::DELETE => delete_file(state, &route, path),
            _ => Err(unsupported()),
        },
        (Scope::File(path), Some("range")) if method == Method::PUT => {
            put_range(state, &route, path, request)
        }
        (Scope::File(path), Some("metadata")) if method == Method::PUT => {
            set_file_metadata(state, &route, path, request)
        }
        (Scope::File(path), Some("properties")) if method == Method::PUT => {
            set_file_properties(state, &route, path, request)
        }
        (Scope::File(path), Some("copy")) if method == Method::PUT => {
            abort_copy(state, &route, path, request)
        }
        _ => Err(unsupported()),
    }
}

fn unsupported() -> Box<StorageResponse> {
    fail(
        StatusCode::BAD_REQUEST,
        "UnsupportedHttpVerb",
        "The resource doesn't support the specified HTTP verb.",
    )
}

fn share_mut<'s>(state: &'s mut ServiceState, route: &Route) -> Result<&'s mut ShareEntry, Box<StorageResponse>> {
    state.shares.get_mut(&route.share).ok_or_else(share_not_found)
}

fn file_mut<'s>(share: &'s mut ShareEntry, path: &str) -> Result<&'s mut FileEntry, Box<StorageResponse>> {
    share.files.get_mut(path).ok_or_else(resource_not_found)
}

fn create_share(state: &mut ServiceState, route: &Route, request: &StorageRequest) -> Outcome {
    if state.shares.contains_key(&route.share) {
        return Err(fail(StatusCode::CONFLICT, "ShareAlreadyExists", "The specified share already exists."));
    }
    let quota = match request.header_str(X_MS_SHARE_QUOTA) {
        Some(value) => Some(value.parse().map_err(|_| invalid_header(X_MS_SHARE_QUOTA))?),
        None => None,
    };
    let share = state.new_share(quota, Metadata::from_headers(&request.headers));
    let response = stamped(StatusCode::CREATED, &share.stamp);
    state.shares.insert(route.share.clone(), share);
    Ok(response)
}

fn delete_share(state: &mut ServiceState, route: &Route) -> Outcome {
    state.shares.remove(&route.share).ok_or_else(share_not_found)?;
    Ok(StorageResponse::new(StatusCode::ACCEPTED))
}

fn share_properties(state: &mut ServiceState, route: &Route) -> Outcome {
    let share = share_mut(state, route)?;
    let mut response = stamped(StatusCode::OK, &share.stamp);
    set(&mut response, X_MS_SHARE_QUOTA, &share.quota_gib.to_string());
    write_metadata(&mut response, &share.metadata);
    Ok(response)
}

fn create_directory(state: &mut ServiceState, route: &Route, path: &str, request: &StorageRequest) -> Outcome {
    let stamp = state.stamp();
    let share = share_mut(state, route)?;
    if path.is_empty() || share.directories.contains_key(path) {
        return Err(fail(StatusCode::CONFLICT, "ResourceAlreadyExists", "The specified resource already exists."));
    }
    if share.files.contains_key(path) {
        return Err(fail(StatusCode::CONFLICT, "ResourceTypeMismatch", "The specified resource type does not match the type of the resource."));
    }
    if !share.directory_exists(parent_of(path)) {
        return Err(parent_not_found());
    }

    let mut response = stamped(StatusCode::CREATED, &stamp);
    set(&mut response, X_MS_REQUEST_SERVER_ENCRYPTED, "true");
    share.directories.insert(
        path.to_string(),
        DirectoryEntry {
            stamp,
            metadata: Metadata::from_headers(&request.headers),
        },
    );
    Ok(response)
}

fn delete_directory(state: &mut ServiceState, route: &Route, path: &str) -> Outcome {
    let share = share_mut(state, route)?;
    if !share.directories.contains_key(path) {
        return Err(resource_not_found());
    }
    if !share.is_directory_empty(path) {
        return Err(fail(StatusCode::CONFLICT, "DirectoryNotEmpty", "The specified directory is not empty."));
    }
    share.directories.remove(path);
    Ok(StorageResponse::new(StatusCode::ACCEPTED))
}

fn directory_properties(state: &mut ServiceState, route: &Route, path: &str) -> Outcome {
    let share = share_mut(state, route)?;
    let (stamp, metadata) = if path.is_empty() {
        (&share.stamp, &share.metadata)
    } else {
        let directory = share.directories.get(path).ok_or_else(resource_not_found)?;
        (&directory.stamp, &directory.metadata)
    };
    let mut response = stamped(StatusCode::OK, stamp);
    set(&mut response, X_MS_SERVER_ENCRYPTED, "true");
    write_metadata(&mut response, metadata);
    Ok(response)
}

fn list_directory(
    state: &mut ServiceState,
    ctx: &Context<'_>,
    route: &Route,
    path: &str,
    request: &StorageRequest,
) -> Outcome {
    let share = share_mut(state, route)?;
    if !share.directory_exists(path) {
        return Err(resource_not_found());
    }

    let marker = query_value(&request.url, "marker").unwrap_or_default();
    let page_size = match query_value(&request.url, "maxresults") {
        Some(value) => value.parse().map_err(|_| {
            fail(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue", "maxresults is not a number.")
        })?,
        None => ctx.list_page_size,
    };

    let (files, directories) = share.children(path);
    let mut names: Vec<(&str, Option<u64>)> = files
        .iter()
        .map(|(name, file)| (*name, Some(file.content.len() as u64)))
        .chain(directories.iter().map(|name| (*name, None)))
        .filter(|(name, _)| *name >= marker.as_str())
        .collect();
    names.sort_by(|a, b| a.0.cmp(b.0));

    let next_marker = names.get(page_size).map(|(name, _)| name.to_string()).unwrap_or_default();
    names.truncate(page_size);

    let mut entries = String::new();
    for (name, length) in &names {
        match length {
            Some(length) => entries.push_str(&format!(
                "<File><Name>{}</Name><Properties><Content-Length>{length}</Content-Length></Properties></File>",
                escape(*name)
            )),
            None => entries.push_str(&format!(
                "<Directory><Name>{}</Name><Properties /></Directory>",
                escape(*name)
            )),
        }
    }

    let body = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults ServiceEndpoint=\"https://{account}.file.core.windows.net/\" ShareName=\"{share}\" DirectoryPath=\"{path}\"><Marker>{marker}</Marker><MaxResults>{page_size}</MaxResults><Entries>{entries}</Entries><NextMarker>{next}</NextMarker></EnumerationResults>",
        account = ctx.account,
        share = escape(&route.share),
        path = escape(path),
        marker = escape(&marker),
        next = escape(&next_marker),
    );

    let mut response = StorageResponse::new(StatusCode::OK);
    set(&mut response, header::CONTENT_TYPE.as_str(), "application/xml");
    response.body = Bytes::from(body);
    Ok(response)
}

fn create_file(state: &mut ServiceState, route: &Route, path: &str, request: &StorageRequest) -> Outcome {
    match request.header_str(X_MS_TYPE) {
        Some(kind) if kind.eq_ignore_ascii_case("file") => {}
        Some(_) => return Err(invalid_header(X_MS_TYPE)),
        None => return Err(missing_header(X_MS_TYPE)),
    }
    let size: usize = request
        .header_str(X_MS_CONTENT_LENGTH)
        .ok_or_else(|| missing_header(X_MS_CONTENT_LENGTH))?
        .parse()
        .map_err(|_| invalid_header(X_MS_CONTENT_LENGTH))?;

    let file = state.new_file(size, content_settings_from(request), Metadata::from_headers(&request.headers));
    let share = share_mut(state, route)?;
    if !share.directory_exists(parent_of(path)) {
        return Err(parent_not_found());
    }
    if share.directories.contains_key(path) {
        return Err(fail(StatusCode::CONFLICT, "ResourceTypeMismatch", "The specified resource type does not match the type of the resource."));
    }

    let mut response = stamped(StatusCode::CREATED, &file.stamp);
    set(&mut response, X_MS_REQUEST_SERVER_ENCRYPTED, "true");
    share.files.insert(path.to_string(), file);
    Ok(response)
}

fn delete_file(state: &mut ServiceState, route: &Route, path: &str) -> Outcome {
    let share = share_mut(state, route)?;
    share.files.remove(path).ok_or_else(resource_not_found)?;
    Ok(StorageResponse::new(StatusCode::ACCEPTED))
}

/// Headers describing a file on GET and HEAD, with any header overrides
/// the request's token carries.
fn describe_file(response: &mut StorageResponse, file: &FileEntry, principal: &Principal) {
    set(response, header::ETAG.as_str(), &file.stamp.etag);
    set(response, header::LAST_MODIFIED.as_str(), &to_rfc1123(file.stamp.last_modified));
    set(response, X_MS_TYPE, "File");
    set(response, X_MS_SERVER_ENCRYPTED, "true");
    set(response, header::ACCEPT_RANGES.as_str(), "bytes");

    let overrides = match principal {
        Principal::Sas(sas) => sas.headers.clone(),
        Principal::SharedKey => SharedAccessHeaders::default(),
    };
    let pick = |override_value: &Option<String>, stored: &Option<String>| {
        override_value.clone().or_else(|| stored.clone())
    };
    let settings = &file.settings;
    let content_type = pick(&overrides.content_type, &settings.content_type)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    set(response, header::CONTENT_TYPE.as_str(), &content_type);
    let optional = [
        (header::CONTENT_ENCODING, pick(&overrides.content_encoding, &settings.content_encoding)),
        (header::CONTENT_LANGUAGE, pick(&overrides.content_language, &settings.content_language)),
        (header::CONTENT_DISPOSITION, pick(&overrides.content_disposition, &settings.content_disposition)),
        (header::CACHE_CONTROL, pick(&overrides.cache_control, &settings.cache_control)),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            if let Ok(value) = HeaderValue::from_str(&value) {
                response.headers.insert(name, value);
            }
        }
    }

    write_metadata(response, &file.metadata);
    if let Some(record) = &file.copy {
        if let Err(e) = record.state.write_headers(&mut response.headers) {
            warn!(copy_id = %record.state.copy_id, error = %e, "copy state left out of response");
        }
    }
}

fn head_file(
    state: &mut ServiceState,
    route: &Route,
    path: &str,
    request: &StorageRequest,
    principal: &Principal,
) -> Outcome {
    let share = share_mut(state, route)?;
    let file = file_mut(share, path)?;
    check_if_match(request, &file.stamp)?;

    let mut response = StorageResponse::new(StatusCode::OK);
    describe_file(&mut response, file, principal);
    set(&mut response, header::CONTENT_LENGTH.as_str(), &file.content.len().to_string());
    if let Some(md5) = &file.content_md5 {
        set(&mut response, "content-md5", md5);
    }
    Ok(response)
}

fn get_file(
    state: &mut ServiceState,
    route: &Route,
    path: &str,
    request: &StorageRequest,
    principal: &Principal,
) -> Outcome {
    let share = share_mut(state, route)?;
    let file = file_mut(share, path)?;
    check_if_match(request, &file.stamp)?;

    let length = file.content.len() as u64;
    let range = request
        .header_str(X_MS_RANGE)
        .or_else(|| request.header_str(header::RANGE.as_str()));

    let mut response = match range {
        Some(value) => {
            let (start, end) = parse_range(value).ok_or_else(|| invalid_header(X_MS_RANGE))?;
            if start >= length {
                let mut denied = error_response(
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    "InvalidRange",
                    "The range specified is invalid for the current size of the resource.",
                );
                set(&mut denied, header::CONTENT_RANGE.as_str(), &format!("bytes */{length}"));
                return Err(Box::new(denied));
            }
            let end = end.map_or(length - 1, |end| end.min(length - 1));

            let mut response = StorageResponse::new(StatusCode::PARTIAL_CONTENT);
            set(&mut response, header::CONTENT_RANGE.as_str(), &format!("bytes {start}-{end}/{length}"));
            response.body = Bytes::copy_from_slice(&file.content[start as usize..=end as usize]);
            response
        }
        None => {
            let mut response = StorageResponse::new(StatusCode::OK);
            if let Some(md5) = &file.content_md5 {
                set(&mut response, "content-md5", md5);
            }
            response.body = Bytes::copy_from_slice(&file.content);
            response
        }
    };

    describe_file(&mut response, file, principal);
    let body_length = response.body.len().to_string();
    set(&mut response, header::CONTENT_LENGTH.as_str(), &body_length);
    Ok(response)
}

fn put_range(state: &mut ServiceState, route: &Route, path: &str, request: &StorageRequest) -> Outcome {
    let stamp = state.stamp();
    let share = share_mut(state, route)?;
    let file = file_mut(share, path)?;
    check_if_match(request, &file.stamp)?;

    let (start, end) = request
        .header_str(X_MS_RANGE)
        .ok_or_else(|| missing_header(X_MS_RANGE))
        .and_then(|value| parse_range(value).ok_or_else(|| invalid_header(X_MS_RANGE)))?;
    let end = end.ok_or_else(|| invalid_header(X_MS_RANGE))?;
    if end >= file.content.len() as u64 {
        return Err(fail(
            StatusCode::RANGE_NOT_SATISFIABLE,
            "InvalidRange",
            "The range specified is invalid for the current size of the resource.",
        ));
    }
    let (start, end) = (start as usize, end as usize);

    match request.header_str(X_MS_WRITE) {
        Some("update") => {
            if request.body.len() != end - start + 1 {
                return Err(invalid_header(header::CONTENT_LENGTH.as_str()));
            }
            file.content[start..=end].copy_from_slice(&request.body);
        }
        Some("clear") => file.content[start..=end].fill(0),
        Some(_) => return Err(invalid_header(X_MS_WRITE)),
        None => return Err(missing_header(X_MS_WRITE)),
    }

    let mut response = stamped(StatusCode::CREATED, &stamp);
    set(&mut response, X_MS_REQUEST_SERVER_ENCRYPTED, "true");
    file.stamp = stamp;
    Ok(response)
}

fn set_file_metadata(state: &mut ServiceState, route: &Route, path: &str, request: &StorageRequest) -> Outcome {
    let stamp = state.stamp();
    let share = share_mut(state, route)?;
    let file = file_mut(share, path)?;
    check_if_match(request, &file.stamp)?;

    file.metadata = Metadata::from_headers(&request.headers);
    let response = stamped(StatusCode::OK, &stamp);
    file.stamp = stamp;
    Ok(response)
}

fn set_file_properties(state: &mut ServiceState, route: &Route, path: &str, request: &StorageRequest) -> Outcome {
    let stamp = state.stamp();
    let share = share_mut(state, route)?;
    let file = file_mut(share, path)?;
    check_if_match(request, &file.stamp)?;

    if let Some(value) = request.header_str(X_MS_CONTENT_LENGTH) {
        let size: usize = value.parse().map_err(|_| invalid_header(X_MS_CONTENT_LENGTH))?;
        file.content.resize(size, 0);
    }
    // Unspecified content headers are cleared
    file.settings = content_settings_from(request);
    file.content_md5 = request.header_str(X_MS_CONTENT_MD5).map(str::to_string);

    let response = stamped(StatusCode::OK, &stamp);
    file.stamp = stamp;
    Ok(response)
}

fn start_copy(
    state: &mut ServiceState,
    ctx: &Context<'_>,
    route: &Route,
    path: &str,
    request: &StorageRequest,
    principal: &Principal,
) -> Outcome {
    let source_value = request.header_str(X_MS_COPY_SOURCE).unwrap_or_default();
    let source_url = Url::parse(source_value).map_err(|_| invalid_header(X_MS_COPY_SOURCE))?;
    let cannot_verify = || {
        fail(
            StatusCode::NOT_FOUND,
            "CannotVerifyCopySource",
            "The specified resource does not exist.",
        )
    };
    let source_route = Route::parse(ctx.account, &source_url)?.ok_or_else(cannot_verify)?;
    let Scope::File(source_path) = &source_route.scope else {
        return Err(invalid_header(X_MS_COPY_SOURCE));
    };
    ctx.authorizer
        .authorize_copy_source(&source_url, &source_route, principal)?;

    let source = state
        .shares
        .get(&source_route.share)
        .and_then(|share| share.files.get(source_path))
        .cloned()
        .ok_or_else(cannot_verify)?;

    let stamp = state.stamp();
    let copy_id = state.next_copy_id();
    let share = share_mut(state, route)?;
    if !share.directory_exists(parent_of(path)) {
        return Err(parent_not_found());
    }
    if share.files.get(path).is_some_and(FileEntry::has_pending_copy) {
        return Err(fail(
            StatusCode::CONFLICT,
            "PendingCopyOperation",
            "There is currently a pending copy operation.",
        ));
    }

    let requested_metadata = Metadata::from_headers(&request.headers);
    let metadata = if requested_metadata.is_empty() {
        source.metadata.clone()
    } else {
        requested_metadata
    };

    let mut recorded_source = source_url.clone();
    recorded_source.set_query(None);
    let total = source.content.len() as u64;
    let immediate = ctx.copy_completion == CopyCompletion::Immediate;
    let state_record = CopyState {
        copy_id: copy_id.clone(),
        status: if immediate { CopyStatus::Success } else { CopyStatus::Pending },
        source: Some(recorded_source.to_string()),
        total_bytes: Some(total),
        bytes_copied: Some(if immediate { total } else { 0 }),
        completion_time: immediate.then_some(stamp.last_modified),
        status_description: None,
    };

    let destination = FileEntry {
        stamp: stamp.clone(),
        metadata,
        content: if immediate {
            source.content.clone()
        } else {
            vec![0; source.content.len()]
        },
        settings: source.settings.clone(),
        content_md5: if immediate { source.content_md5.clone() } else { None },
        copy: Some(CopyRecord {
            state: state_record.clone(),
            source_content: source.content,
        }),
    };
    share.files.insert(path.to_string(), destination);

    let mut response = stamped(StatusCode::ACCEPTED, &stamp);
    set(&mut response, X_MS_COPY_ID, &copy_id);
    set(&mut response, X_MS_COPY_STATUS, state_record.status.as_str());
    Ok(response)
}

fn abort_copy(state: &mut ServiceState, route: &Route, path: &str, request: &StorageRequest) -> Outcome {
    match request.header_str(X_MS_COPY_ACTION) {
        Some("abort") => {}
        Some(_) => return Err(invalid_header(X_MS_COPY_ACTION)),
        None => return Err(missing_header(X_MS_COPY_ACTION)),
    }
    let copy_id = query_value(&request.url, "copyid").ok_or_else(|| {
        fail(
            StatusCode::BAD_REQUEST,
            "MissingRequiredQueryParameter",
            "A query parameter that's mandatory for this request is not specified: copyid",
        )
    })?;

    let stamp = state.stamp();
    let share = share_mut(state, route)?;
    let file = file_mut(share, path)?;
    let record = file
        .copy
        .as_mut()
        .filter(|record| record.state.status == CopyStatus::Pending && record.state.copy_id == copy_id)
        .ok_or_else(|| {
            fail(
                StatusCode::CONFLICT,
                "NoPendingCopyOperation",
                "There is currently no pending copy operation.",
            )
        })?;

    record.state.status = CopyStatus::Aborted;
    record.state.completion_time = Some(stamp.last_modified);
    file.content.clear();

    let response = stamped(StatusCode::NO_CONTENT, &stamp);
    file.stamp = stamp;
    Ok(response)
}
