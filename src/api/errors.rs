use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::dto::Envelope;
use crate::error::ServiceError;

#[derive(Debug)]
pub struct AppError(pub ServiceError);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0 {
            ServiceError::InvalidInput(_) | ServiceError::UnknownOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let ServiceError::Storage(e) = &self.0 {
            error!(error = ?e, "Storage failure");
        }
        let status = self.status();
        let body = Json(Envelope::failure(self.0.public_message()));
        (status, body).into_response()
    }
}

impl<E: Into<ServiceError>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
