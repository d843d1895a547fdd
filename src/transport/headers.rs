//! Header names used on the wire.

pub const X_MS_VERSION: &str = "x-ms-version";
pub const X_MS_DATE: &str = "x-ms-date";
pub const X_MS_CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
pub const X_MS_ERROR_CODE: &str = "x-ms-error-code";
pub const X_MS_META_PREFIX: &str = "x-ms-meta-";
pub const X_MS_TYPE: &str = "x-ms-type";
pub const X_MS_RANGE: &str = "x-ms-range";
pub const X_MS_WRITE: &str = "x-ms-write";
pub const X_MS_CONTENT_LENGTH: &str = "x-ms-content-length";
pub const X_MS_CONTENT_TYPE: &str = "x-ms-content-type";
pub const X_MS_CONTENT_ENCODING: &str = "x-ms-content-encoding";
pub const X_MS_CONTENT_LANGUAGE: &str = "x-ms-content-language";
pub const X_MS_CONTENT_DISPOSITION: &str = "x-ms-content-disposition";
pub const X_MS_CACHE_CONTROL: &str = "x-ms-cache-control";
pub const X_MS_CONTENT_MD5: &str = "x-ms-content-md5";
pub const X_MS_SERVER_ENCRYPTED: &str = "x-ms-server-encrypted";
pub const X_MS_REQUEST_SERVER_ENCRYPTED: &str = "x-ms-request-server-encrypted";
pub const X_MS_SHARE_QUOTA: &str = "x-ms-share-quota";

pub const X_MS_COPY_SOURCE: &str = "x-ms-copy-source";
pub const X_MS_COPY_ID: &str = "x-ms-copy-id";
pub const X_MS_COPY_STATUS: &str = "x-ms-copy-status";
pub const X_MS_COPY_PROGRESS: &str = "x-ms-copy-progress";
pub const X_MS_COPY_COMPLETION_TIME: &str = "x-ms-copy-completion-time";
pub const X_MS_COPY_STATUS_DESCRIPTION: &str = "x-ms-copy-status-description";
pub const X_MS_COPY_ACTION: &str = "x-ms-copy-action";

/// Service version sent with every request.
pub const SERVICE_VERSION: &str = "2019-02-02";
