use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::store::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = match &self {
            ObserverError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ObserverError::Unauthorized => StatusCode::UNAUTHORIZED,
            ObserverError::NotFound(_) => StatusCode::NOT_FOUND,
            ObserverError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
