pub use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict ({status}): {body}")]
    Conflict { status: StatusCode, body: String },

    #[error("HTTP error {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("Data error: {0}")]
    Data(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when the underlying request gave up waiting for a response.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
