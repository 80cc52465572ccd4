use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address format: {0:?}")]
    InvalidFormat(String),
}

/// Failure looking up a social identity. A "not found" answer is not an error.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("lookup returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected lookup response: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Structured error body returned by the posting API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("posting API rejected the cast ({status}): {}", .body.message.as_deref().unwrap_or("no message"))]
    Api { status: u16, body: ApiErrorBody },
    #[error("posting API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl PublishError {
    /// Classify a non-success response body: structured when it parses as an
    /// API error object, raw otherwise.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) if parsed.code.is_some() || parsed.message.is_some() => PublishError::Api {
                status,
                body: parsed,
            },
            _ => PublishError::Status {
                status,
                body: body.to_string(),
            },
        }
    }
}
