// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for SceneForge
//!
//! This module defines all error types used throughout the pipeline.

use thiserror::Error;

/// Main error type for SceneForge operations
#[derive(Error, Debug)]
pub enum ForgeError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Errors raised by the response processing pipeline itself
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No stream fragment arrived within the stall window
    #[error("Stream stalled: no fragment within {secs} seconds")]
    StallTimeout { secs: u64 },

    /// The model returned an empty response after all retries
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// No extraction strategy matched the response text
    #[error("No code could be extracted from the response")]
    ExtractionFailed,
}

/// Result type alias for SceneForge operations
pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Human-readable guidance for user-facing surfaces.
    ///
    /// Configuration and authentication problems get actionable hints; the
    /// rest fall back to the error's display form.
    pub fn user_message(&self) -> String {
        match self {
            ForgeError::Api(ApiError::AuthenticationFailed) => {
                "Authentication failed. Check your API key in settings.".to_string()
            }
            ForgeError::Api(ApiError::RateLimited(secs)) => {
                format!("The provider is rate limiting requests. Try again in {secs} seconds.")
            }
            ForgeError::Config(msg) => {
                format!("Configuration problem: {msg}")
            }
            ForgeError::Pipeline(PipelineError::EmptyResponse) => {
                "The model returned nothing. Try rephrasing your request.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forge_error_config() {
        let err = ForgeError::Config("missing api key".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("missing api key"));
    }

    #[test]
    fn test_forge_error_invalid_input() {
        let err = ForgeError::InvalidInput("bad input".to_string());
        assert!(err.to_string().contains("Invalid input"));
    }

    #[test]
    fn test_forge_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let forge_err: ForgeError = io_err.into();
        assert!(forge_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_forge_error_from_api_error() {
        let api_err = ApiError::AuthenticationFailed;
        let forge_err: ForgeError = api_err.into();
        assert!(forge_err.to_string().contains("API error"));
    }

    #[test]
    fn test_forge_error_debug() {
        let err = ForgeError::Config("test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Config"));
    }

    #[test]
    fn test_api_error_authentication_failed() {
        let err = ApiError::AuthenticationFailed;
        assert!(err.to_string().contains("Authentication failed"));
    }

    #[test]
    fn test_api_error_rate_limited() {
        let err = ApiError::RateLimited(30);
        assert!(err.to_string().contains("Rate limited"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_api_error_network() {
        let err = ApiError::Network("connection refused".to_string());
        assert!(err.to_string().contains("Network error"));
    }

    #[test]
    fn test_api_error_server_error() {
        let err = ApiError::ServerError {
            status: 500,
            message: "internal server error".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("internal server error"));
    }

    #[test]
    fn test_api_error_timeout() {
        let err = ApiError::Timeout;
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_api_error_stream_error() {
        let err = ApiError::StreamError("stream closed".to_string());
        assert!(err.to_string().contains("Streaming error"));
    }

    #[test]
    fn test_pipeline_error_stall_timeout() {
        let err = PipelineError::StallTimeout { secs: 30 };
        assert!(err.to_string().contains("30"));
        assert!(err.to_string().contains("stalled"));
    }

    #[test]
    fn test_pipeline_error_empty_response() {
        let err = PipelineError::EmptyResponse;
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_pipeline_error_extraction_failed() {
        let err = PipelineError::ExtractionFailed;
        assert!(err.to_string().contains("extracted"));
    }

    #[test]
    fn test_user_message_authentication() {
        let err = ForgeError::Api(ApiError::AuthenticationFailed);
        assert!(err.user_message().contains("API key"));
    }

    #[test]
    fn test_user_message_rate_limited() {
        let err = ForgeError::Api(ApiError::RateLimited(12));
        assert!(err.user_message().contains("12"));
    }

    #[test]
    fn test_user_message_empty_response() {
        let err = ForgeError::Pipeline(PipelineError::EmptyResponse);
        assert!(err.user_message().contains("rephrasing"));
    }

    #[test]
    fn test_result_type_alias() {
        fn test_fn() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(test_fn().unwrap(), 42);
    }
}
