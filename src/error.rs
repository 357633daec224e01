use reqwest::StatusCode;

/// A raw upstream record that could not be turned into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid number in `{field}`: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Failure of a single upstream call.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    #[error("explorer error: {0}")]
    Upstream(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

impl FetchError {
    /// Errors that will not go away on the next poll because the endpoint
    /// configuration itself is broken.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, FetchError::Url(_))
    }
}
