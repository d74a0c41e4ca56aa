use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Form encoding error: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),

    #[error("Rate limited: {retry_after:?}")]
    RateLimit { retry_after: Option<u64> },

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected content-type from {endpoint}: {content_type}")]
    UnexpectedContentType { endpoint: String, content_type: String },

    #[error("Unrecognized response shape: {0}")]
    UnrecognizedShape(String),

    #[error("{function} failed: {errorcode} | {message}")]
    Remote {
        function: String,
        errorcode: String,
        message: String,
    },

    #[error("{function} returned warnings: {warnings}")]
    Warnings { function: String, warnings: String },

    #[error("Unexpected response from {function}: {body}")]
    UnexpectedResponse { function: String, body: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Transient failures worth another attempt on an idempotent request.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(e) => !e.is_decode() && !e.is_builder() && !e.is_status(),
            ApiError::Server { status, .. } if *status >= 500 => true,
            ApiError::RateLimit { .. } => true,
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether the remote gateway refused the function for this token.
    pub fn is_access_exception(&self) -> bool {
        match self {
            ApiError::Remote {
                errorcode, message, ..
            } => {
                errorcode.eq_ignore_ascii_case("accessexception")
                    || message.to_ascii_lowercase().contains("accessexception")
            }
            _ => false,
        }
    }
}

impl From<quick_xml::Error> for ApiError {
    fn from(error: quick_xml::Error) -> Self {
        ApiError::Xml(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
