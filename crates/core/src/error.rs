use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories shared by every layer of the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Extraction,
    ProviderUnavailable,
    IndexUnavailable,
    Internal,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("pdf parse error: {0}")]
    Parse(String),

    #[error("document payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Extraction
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("malformed response from {backend}: {details}")]
    MalformedResponse { backend: String, details: String },

    #[error("{0} timed out")]
    Timeout(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ProviderUnavailable
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index {index} is unavailable: {details}")]
    IndexUnavailable { index: String, details: String },

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{0} timed out")]
    Timeout(String),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::IndexUnavailable { .. } | SearchError::DimensionMismatch { .. } => {
                ErrorKind::IndexUnavailable
            }
            SearchError::Url(_) | SearchError::Serialization(_) => ErrorKind::Internal,
            SearchError::BackendResponse { .. } | SearchError::Http(_) | SearchError::Timeout(_) => {
                ErrorKind::ProviderUnavailable
            }
        }
    }
}

/// Error surfaced by the orchestrating services.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("{0}")]
    Internal(String),
}

impl RagError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            RagError::Extraction(error) => error.kind(),
            RagError::Provider(error) => error.kind(),
            RagError::Search(error) => error.kind(),
            RagError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand to a caller. Backend details never leave the core.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::InvalidRequest | ErrorKind::Internal => match self {
                RagError::InvalidRequest(message) | RagError::Internal(message) => message.clone(),
                _ => "An internal error occurred.".to_string(),
            },
            ErrorKind::Extraction => "Failed to extract pages text from document.".to_string(),
            ErrorKind::ProviderUnavailable => {
                "A backing service is unavailable, please retry later.".to_string()
            }
            ErrorKind::IndexUnavailable => {
                "The search index is unavailable, please retry later.".to_string()
            }
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
