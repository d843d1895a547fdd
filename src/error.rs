use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for fileshare operations
#[derive(Debug, Error)]
pub enum FileShareError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Authorization failed ({status}/{code}): {message}")]
    AuthorizationFailed {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Precondition failed ({code}): {message}")]
    PreconditionFailed { code: String, message: String },

    #[error("Conflict ({code}): {message}")]
    Conflict { code: String, message: String },

    #[error("Not found ({code}): {message}")]
    NotFound { code: String, message: String },

    #[error("Transient failure: {message}")]
    Transient { status: Option<u16>, message: String },

    #[error("Service error ({status}/{code}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl FileShareError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::NetworkError(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::SerializationError(msg.into())
    }

    pub fn transient<S: Into<String>>(status: Option<u16>, msg: S) -> Self {
        Self::Transient {
            status,
            message: msg.into(),
        }
    }

    /// Map a non-success response to the error taxonomy.
    ///
    /// `code` is the service error code carried in `x-ms-error-code`.
    pub fn from_response<C, M>(status: StatusCode, code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        let code = code.into();
        let message = message.into();
        match status {
            StatusCode::FORBIDDEN => Self::AuthorizationFailed {
                status: status.as_u16(),
                code,
                message,
            },
            StatusCode::PRECONDITION_FAILED => Self::PreconditionFailed { code, message },
            StatusCode::CONFLICT => Self::Conflict { code, message },
            StatusCode::NOT_FOUND => Self::NotFound { code, message },
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Self::Transient {
                status: Some(status.as_u16()),
                message: format!("{code}: {message}"),
            },
            _ => Self::Service {
                status: status.as_u16(),
                code,
                message,
            },
        }
    }

    /// HTTP status the error was mapped from, if it came from the service.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthorizationFailed { status, .. } | Self::Service { status, .. } => {
                Some(*status)
            }
            Self::PreconditionFailed { .. } => Some(412),
            Self::Conflict { .. } => Some(409),
            Self::NotFound { .. } => Some(404),
            Self::Transient { status, .. } => *status,
            _ => None,
        }
    }

    /// Service error code (`x-ms-error-code`), if any.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::AuthorizationFailed { code, .. }
            | Self::PreconditionFailed { code, .. }
            | Self::Conflict { code, .. }
            | Self::NotFound { code, .. }
            | Self::Service { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Whether the retry layer may reissue the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<FileShareError> for std::io::Error {
    fn from(error: FileShareError) -> Self {
        use std::io::ErrorKind;

        let kind = match &error {
            FileShareError::IoError(e) => e.kind(),
            FileShareError::InvalidArgument(_) => ErrorKind::InvalidInput,
            FileShareError::NotFound { .. } => ErrorKind::NotFound,
            FileShareError::AuthorizationFailed { .. } => ErrorKind::PermissionDenied,
            FileShareError::Transient { .. } => ErrorKind::TimedOut,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, error)
    }
}

/// Result type alias for fileshare operations
pub type Result<T> = std::result::Result<T, FileShareError>;
