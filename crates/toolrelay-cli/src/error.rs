//! Error types for CLI operations

use std::fmt;

use thiserror::Error;
use toolrelay_client::{ClientError, ConfigError, TransportError};

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// The client failed
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Configuration could not be loaded or was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Hints for resolving the error
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Client(ClientError::Transport(TransportError::ConnectionFailed(_))) => vec![
                "Check that the tool host is running",
                "Verify the URL given with --url or TOOLRELAY_URL",
            ],
            Self::Client(ClientError::Timeout { .. }) => vec![
                "Increase the deadline with --timeout",
                "Check host responsiveness",
            ],
            Self::Client(ClientError::Handshake(_)) => vec![
                "Check that the host accepts this agent name",
                "Disable the handshake in the configuration file if the host has none",
            ],
            Self::InvalidArguments(_) | Self::Client(ClientError::InvalidParameters(_)) => vec![
                "Parameters must be a JSON object, e.g. --params '{\"q\": \"rust\"}'",
                "Use --help to see expected format",
            ],
            Self::Config(_) => vec!["Check the file passed with --config"],
            Self::Client(error) if error.is_retryable() => {
                vec!["Retry the command once the host is reachable"]
            }
            _ => vec![],
        }
    }

    /// Error category for colored output
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Client(ClientError::Transport(_) | ClientError::Disconnected) => {
                ErrorCategory::Connection
            }
            Self::Client(ClientError::Tool { .. }) => ErrorCategory::Tool,
            Self::Client(ClientError::Timeout { .. }) => ErrorCategory::Timeout,
            Self::Client(ClientError::InvalidParameters(_)) | Self::InvalidArguments(_) => {
                ErrorCategory::User
            }
            Self::Client(ClientError::Config(_)) | Self::Config(_) => ErrorCategory::Config,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Io(_) => ErrorCategory::System,
            _ => ErrorCategory::Other,
        }
    }
}

/// Error categories for colored output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connection,
    User,
    Tool,
    Timeout,
    Parsing,
    System,
    Config,
    Other,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "Connection"),
            Self::User => write!(f, "User Input"),
            Self::Tool => write!(f, "Tool"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Parsing => write!(f, "Parsing"),
            Self::System => write!(f, "System"),
            Self::Config => write!(f, "Configuration"),
            Self::Other => write!(f, "Error"),
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
