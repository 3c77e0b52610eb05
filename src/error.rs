//! # Error Types
//!
//! Custom error types for Drone Dashboard using `thiserror`.

use thiserror::Error;

/// Main error type for Drone Dashboard
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Payload matches neither message dialect, or a snapshot is invalid
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Selection requested for an id that is not currently tracked
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport connection errors
    #[error("Link error: {0}")]
    Link(String),
}

/// Result type alias for Drone Dashboard
pub type Result<T> = std::result::Result<T, DashboardError>;
