use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network request failed: {0}")]
    Network(String),
    #[error("not logged in")]
    NotLoggedIn,
    #[error("server rejected the session credentials")]
    Unauthorized,
    #[error("access denied: {0}")]
    Forbidden(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("messaging transport is not connected")]
    NotConnected,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid response payload: {0}")]
    Decode(String),
    #[error("session store failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ClientError {
    /// Builds the error for a non-success HTTP response.
    pub fn from_status(status: u16, url: &str, body: Option<ApiError>) -> Self {
        let detail = body.as_ref().and_then(ApiError::describe);
        match ErrorCode::from_status(status) {
            ErrorCode::Unauthorized => ClientError::Unauthorized,
            ErrorCode::Forbidden => ClientError::Forbidden(detail.unwrap_or_else(|| url.to_string())),
            ErrorCode::NotFound => ClientError::NotFound(detail.unwrap_or_else(|| url.to_string())),
            ErrorCode::Validation => ClientError::Validation(
                detail.unwrap_or_else(|| format!("request to {url} was rejected")),
            ),
            ErrorCode::Network | ErrorCode::Internal => ClientError::Server {
                status,
                message: detail.unwrap_or_else(|| format!("request to {url} failed")),
            },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Network(_)
            | ClientError::NotConnected
            | ClientError::Transport(_) => ErrorCode::Network,
            ClientError::NotLoggedIn | ClientError::Unauthorized => ErrorCode::Unauthorized,
            ClientError::Forbidden(_) => ErrorCode::Forbidden,
            ClientError::NotFound(_) => ErrorCode::NotFound,
            ClientError::Validation(_) => ErrorCode::Validation,
            ClientError::Server { status, .. } => match ErrorCode::from_status(*status) {
                ErrorCode::Network => ErrorCode::Network,
                _ => ErrorCode::Internal,
            },
            ClientError::Decode(_) | ClientError::Storage(_) => ErrorCode::Internal,
        }
    }

    /// Text shown to the user. Remote failures never leak raw transport
    /// details; validation failures carry the reason because the user can act on it.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(reason) => reason.clone(),
            ClientError::NotLoggedIn | ClientError::Unauthorized => {
                "Your session has expired. Please log in again.".to_string()
            }
            ClientError::Forbidden(_) => {
                "Access denied: you do not have permission to perform this action.".to_string()
            }
            ClientError::NotFound(_) => "The requested resource was not found.".to_string(),
            ClientError::Network(_)
            | ClientError::NotConnected
            | ClientError::Transport(_)
            | ClientError::Server { .. }
            | ClientError::Decode(_)
            | ClientError::Storage(_) => {
                "Something went wrong while contacting the clinic server. Please try again."
                    .to_string()
            }
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
