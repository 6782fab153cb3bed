use thiserror::Error;

/// Errors produced by the persistence and upload clients.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network or transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The response body, typically containing error details.
        message: String,
    },

    /// A request body could not be serialized or a response parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid base URL or other setup problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upload endpoint answered without a usable URL.
    #[error("Upload error: {0}")]
    Upload(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
