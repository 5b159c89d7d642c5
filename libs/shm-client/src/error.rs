use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("session is not authorized")]
    Unauthorized,

    #[error("backend responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response envelope carried no data")]
    EmptyEnvelope,

    #[error("authentication response carried no session id")]
    MissingSession,

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ShmError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ShmError::Unauthorized)
    }
}

pub type Result<T> = std::result::Result<T, ShmError>;
