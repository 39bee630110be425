use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};

use crate::api::response;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("No data from scraping: {0}")]
    NoData(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Upstream request failed with status {status}")]
    Upstream { status: u16, body: String },

    #[error("Failed to fetch data: {0}")]
    FetchError(String),

    #[error("LLM processing error: {0}")]
    LlmError(String),

    #[error("Error parsing content: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::NoData(_) | AppError::NotFound(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::FetchError(_)
            | AppError::LlmError(_)
            | AppError::ParseError(_)
            | AppError::ConfigError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Collapse fetch failures into an opaque 500, for routes that do not
    /// forward upstream statuses.
    pub fn into_internal(self) -> Self {
        match self {
            AppError::Upstream { status, body } => {
                AppError::Internal(format!("upstream status {}: {}", status, body))
            }
            AppError::FetchError(msg) => AppError::Internal(msg),
            other => other,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match self {
            AppError::Validation(msg) | AppError::NotFound(msg) => (msg, None),
            AppError::NoData(details) => ("No data from scraping".to_string(), Some(details)),
            AppError::Upstream { body, .. } => {
                ("Failed to fetch content from upstream".to_string(), Some(body))
            }
            AppError::FetchError(details) => ("Failed to fetch page".to_string(), Some(details)),
            AppError::LlmError(details) => {
                ("Error processing your request".to_string(), Some(details))
            }
            AppError::ParseError(details) | AppError::Internal(details) => {
                ("Error processing your request".to_string(), Some(details))
            }
            AppError::ConfigError(details) => ("Configuration error".to_string(), Some(details)),
        };

        response::error(status, message, details).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::FetchError(err.to_string())
    }
}

impl From<std::env::VarError> for AppError {
    fn from(err: std::env::VarError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
