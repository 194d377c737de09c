// src/domain/errors.rs
use thiserror::Error;

/// Message shown when the backend gives no reason for a failure
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Push channel error: {0}")]
    Push(#[from] PushError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Unknown(s)
    }
}

/// Failures talking to the trading backend over HTTP
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or(GENERIC_ERROR_MESSAGE))]
    Http { status: u16, message: Option<String> },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Human-readable message supplied by the backend, if any
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ApiError::Http { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Text suitable for a user notification
    pub fn user_message(&self) -> String {
        self.backend_message()
            .map(str::to_string)
            .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid export filename: {0}")]
    InvalidFilename(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("{0} is already in progress")]
    InFlight(&'static str),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid push event: {0}")]
    InvalidEvent(String),
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ApiResult<T> = Result<T, ApiError>;
pub type ExportResult<T> = Result<T, ExportError>;
pub type MutationResult<T> = Result<T, MutationError>;
pub type PushResult<T> = Result<T, PushError>;
