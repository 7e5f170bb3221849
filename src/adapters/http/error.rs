use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::application::dto::ErrorResponse;
use crate::domain::errors::DetectError;

impl DetectError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DetectError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            DetectError::EmptyFile | DetectError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            DetectError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            DetectError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            DetectError::InferenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Único punto donde un error se traduce a respuesta HTTP.
/// El cuerpo lleva solo el código; el detalle interno se queda en los logs.
impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let body = ErrorResponse { detail: self.code().to_string() };
        (self.status_code(), Json(body)).into_response()
    }
}
