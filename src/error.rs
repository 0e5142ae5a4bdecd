//! Error types for Tolk.

use thiserror::Error;

/// Library-level error type for Tolk operations.
#[derive(Error, Debug)]
pub enum TolkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model call timed out after {0:?}")]
    ModelTimeout(std::time::Duration),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("Agent exceeded maximum rounds ({limit})")]
    RoundLimitExceeded { limit: usize },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Thread store error: {0}")]
    ThreadStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TolkError {
    /// Whether this error aborted a turn before any state was committed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TolkError::ModelUnavailable(_) | TolkError::ModelTimeout(_) | TolkError::Cancelled
        )
    }
}

/// Result type alias for Tolk operations.
pub type Result<T> = std::result::Result<T, TolkError>;
