//! Error types for memvid-mcp
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for each failure mode of the memory pipeline
//! - Machine-readable error codes
//! - HTTP status code mapping (loopback bridge)
//! - One-sentence user messages (tool responses)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Store lifecycle errors (2xxx)
    NotInitialized,
    FileError,

    // Store operation errors (3xxx)
    StoreError,
    SearchError,
    DatabaseError,

    // Pipeline errors (4xxx)
    AskError,

    // External service errors (8xxx)
    EmbeddingError,
    ProviderError,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1002,

            // Lifecycle (2xxx)
            ErrorCode::NotInitialized => 2001,
            ErrorCode::FileError => 2002,

            // Store (3xxx)
            ErrorCode::StoreError => 3001,
            ErrorCode::SearchError => 3002,
            ErrorCode::DatabaseError => 3003,

            // Pipeline (4xxx)
            ErrorCode::AskError => 4001,

            // External (8xxx)
            ErrorCode::EmbeddingError => 8001,
            ErrorCode::ProviderError => 8002,
            ErrorCode::UpstreamError => 8003,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Store lifecycle
    #[error("Memory store is not initialized")]
    NotInitialized,

    #[error("Memory file error: {message}")]
    FileError { message: String },

    // Store operations
    #[error("Failed to store memory: {message}")]
    StoreError { message: String },

    #[error("Search failed: {message}")]
    SearchError { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    // Pipeline
    #[error("Ask failed: {message}")]
    AskError { message: String },

    // External services
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Provider {provider} failed: {message}")]
    ProviderError { provider: String, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a provider failure
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ProviderError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::NotInitialized => ErrorCode::NotInitialized,
            AppError::FileError { .. } => ErrorCode::FileError,
            AppError::StoreError { .. } => ErrorCode::StoreError,
            AppError::SearchError { .. } => ErrorCode::SearchError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::AskError { .. } => ErrorCode::AskError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::ProviderError { .. } => ErrorCode::ProviderError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            AppError::FileError { .. } |
            AppError::StoreError { .. } |
            AppError::SearchError { .. } |
            AppError::Database(_) |
            AppError::AskError { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. } |
            AppError::ProviderError { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// One-sentence description suitable for a tool response.
    ///
    /// Never contains internal identifiers or backtraces; upstream detail is
    /// kept only for provider and validation failures where it helps the caller.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation { message, .. } => format!("Invalid input: {}.", message.trim_end_matches('.')),
            AppError::InvalidFormat { message } => format!("Invalid input: {}.", message.trim_end_matches('.')),
            AppError::NotInitialized => "The memory store is not open; restart the memory server.".to_string(),
            AppError::FileError { .. } => "The memory file could not be opened or created.".to_string(),
            AppError::StoreError { .. } | AppError::Database(_) => "The memory could not be saved to the store.".to_string(),
            AppError::SearchError { .. } => "Searching the memory store failed.".to_string(),
            AppError::AskError { .. } => "Answering the question from memory failed.".to_string(),
            AppError::EmbeddingError { .. } => "Generating the embedding for this memory failed.".to_string(),
            AppError::ProviderError { provider, .. } => format!("The language model provider '{}' failed.", provider),
            AppError::HttpClient(_) => "A request to an external service failed.".to_string(),
            AppError::Configuration { .. } => "The memory server is misconfigured.".to_string(),
            AppError::Internal { .. } | AppError::Serialization(_) | AppError::Other(_) => {
                "An internal error occurred in the memory server.".to_string()
            }
        }
    }
}

/// Structured error response for the bridge API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileError {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::SearchError { message: "fts".into() };
        assert_eq!(err.code(), ErrorCode::SearchError);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code().as_code(), 3002);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "title must not be empty".into(),
            field: Some("title".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
        assert_eq!(err.user_message(), "Invalid input: title must not be empty.");
    }

    #[test]
    fn test_provider_error_is_upstream() {
        let err = AppError::provider("openai", "429 Too Many Requests");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "Provider openai failed: 429 Too Many Requests");
        assert_eq!(err.user_message(), "The language model provider 'openai' failed.");
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = AppError::SearchError {
            message: "fts5: syntax error near \"?\"".into(),
        };
        let msg = err.user_message();
        assert!(!msg.contains("fts5"));
        assert!(msg.ends_with('.'));
    }

    #[test]
    fn test_io_error_maps_to_file_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AppError = io.into();
        assert_eq!(err.code(), ErrorCode::FileError);
    }
}
