// SPDX-License-Identifier: MIT

//! Error types for the device API client

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("client setup failed: {0}")]
    ClientSetup(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ApiError::Status(404).to_string(),
            "unexpected HTTP status 404"
        );
        assert_eq!(ApiError::Timeout.to_string(), "request timed out");
        assert_eq!(
            ApiError::MalformedResponse("missing field".to_string()).to_string(),
            "malformed response: missing field"
        );
    }
}
