use std::io;
use thiserror::Error;

pub type PushResult<T> = Result<T, PushError>;

/// Push connection errors
#[derive(Error, Debug)]
pub enum PushError {
    /// Credential provider could not produce connection credentials
    #[error("Credential fetch failed: {0}")]
    Credentials(String),

    /// Transport refused to open with the supplied credentials
    #[error("Transport error: {0}")]
    Transport(String),

    /// Consecutive connect failures reached the configured budget
    #[error("Giving up after {attempts} connect attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: Box<PushError>,
    },

    /// Server sent data the manager cannot act on
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error (config file access)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl PushError {
    /// Create a new credential error
    pub fn credentials<S: Into<String>>(msg: S) -> Self {
        PushError::Credentials(msg.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        PushError::Transport(msg.into())
    }

    /// Create a new malformed payload error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        PushError::MalformedPayload(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        PushError::InvalidConfig(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        PushError::InvalidState(msg.into())
    }

    /// Wrap the last failure of a connect chain as the fatal exhaustion error
    pub fn exhausted(attempts: u32, last_error: PushError) -> Self {
        PushError::RetriesExhausted {
            attempts,
            last_error: Box::new(last_error),
        }
    }

    /// Whether the error must reach the process-level reporter
    pub fn is_fatal(&self) -> bool {
        matches!(self, PushError::RetriesExhausted { .. })
    }
}
