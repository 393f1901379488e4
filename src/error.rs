// src/error.rs
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Debug, Serialize)]
pub struct ErrorResponseBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_response: Option<Value>,
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected before any request was sent.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// The server answered with a non-ok status.
    #[error("Technitium API error: {message}")]
    Api { message: String, response: Value },

    #[error("could not decode API response: {0}")]
    Decode(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn api(message: impl Into<String>, response: Value) -> Self {
        AppError::Api {
            message: message.into(),
            response,
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        AppError::Decode(msg.into())
    }

    pub fn internal<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }

    /// Process exit status for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_) => 2,
            AppError::Transport(_) | AppError::Http { .. } => 3,
            AppError::Api { .. } => 4,
            AppError::Decode(_) | AppError::Internal(_) => 1,
        }
    }

    pub fn to_body(&self) -> ErrorResponseBody {
        let api_response = match self {
            AppError::Api { response, .. } => Some(response.clone()),
            _ => None,
        };
        ErrorResponseBody {
            error: self.to_string(),
            api_response,
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(AppError::validation("x").exit_code(), 2);
        assert_eq!(
            AppError::Http {
                status: 502,
                body: String::new()
            }
            .exit_code(),
            3
        );
        assert_eq!(AppError::api("boom", json!({})).exit_code(), 4);
        assert_eq!(AppError::decode("x").exit_code(), 1);
    }

    #[test]
    fn api_error_body_carries_raw_response() {
        let raw = json!({"status": "error", "errorMessage": "No such zone was found"});
        let body = AppError::api("No such zone was found", raw.clone()).to_body();
        assert_eq!(body.api_response, Some(raw));
        assert!(body.error.contains("No such zone was found"));
    }
}
