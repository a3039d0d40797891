use reqwest::StatusCode;
use std::io;
use thiserror::Error;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Main error type for the chat adapter and its collaborators
#[derive(Error, Debug)]
pub enum ModelError {
    /// Stream disconnected before completion
    #[error("stream disconnected before completion: {0}")]
    Stream(String),

    /// Unexpected HTTP status code
    #[error("unexpected status {0}: {1}")]
    UnexpectedStatus(StatusCode, String),

    /// Rate limit exceeded
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// Authentication error
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Invalid request parameters
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider-specific error
    #[error("provider error: {0}")]
    Provider(String),

    /// The response lacked a field the adapter needs
    #[error("malformed response: missing {0}")]
    MalformedResponse(&'static str),

    /// Checkpoint store could not be read or written
    #[error("checkpoint store error: {0}")]
    Checkpoint(String),

    /// Environment variable error
    #[error("missing environment variable: {0}")]
    EnvVar(#[from] EnvVarError),

    // Automatic conversions for common external error types
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Environment variable error
#[derive(Debug)]
pub struct EnvVarError {
    /// Name of the environment variable that is missing
    pub var: String,
    /// Optional instructions to help the user get a valid value
    pub instructions: Option<String>,
}

impl std::fmt::Display for EnvVarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Missing environment variable: `{}`", self.var)?;
        if let Some(instructions) = &self.instructions {
            write!(f, ". {}", instructions)?;
        }
        Ok(())
    }
}

impl std::error::Error for EnvVarError {}
