//! Error types for guru-core

use thiserror::Error;

/// The main error type for guru-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (history and config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from an AI provider
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A provider answered with something we could not use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A specialized Result type for guru-core operations
pub type Result<T> = std::result::Result<T, Error>;
