use axum::extract::multipart::{Field, Multipart, MultipartError, MultipartRejection};
use axum::{extract::State, http::HeaderMap, Json};
use std::time::Instant;
use tracing::{error, warn};

use crate::adapters::http::state::HttpState;
use crate::application::auth::API_KEY_HEADER;
use crate::application::dto::HealthResponse;
use crate::domain::{
    detection::DetectionResponse,
    errors::{DetectError, DetectResult},
    upload::UploadedImage,
};

/// Campo del formulario donde los clientes envían la imagen.
const FILE_FIELD: &str = "file";

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

pub async fn detect(
    State(st): State<HttpState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> DetectResult<Json<DetectionResponse>> {
    // La credencial se valida antes de tocar el cuerpo
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| std::str::from_utf8(v.as_bytes()).ok());
    st.detection.authenticate(presented)?;

    let started = Instant::now();

    let mut multipart = multipart.map_err(|e| {
        warn!(error = %e, "Request is not a valid multipart upload");
        DetectError::MissingFile
    })?;
    let upload = read_upload(&mut multipart, st.max_body_size).await?;

    let response = st.detection.detect(upload, started).await?;
    Ok(Json(response))
}

/// Lee el primer campo con archivo (o el campo `file`) completo en memoria.
async fn read_upload(multipart: &mut Multipart, limit: Option<usize>) -> DetectResult<UploadedImage> {
    while let Some(field) = multipart.next_field().await.map_err(read_failure)? {
        if field.name() != Some(FILE_FIELD) && field.file_name().is_none() {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = read_field(field, limit).await?;

        return Ok(UploadedImage {
            bytes,
            filename,
            content_type,
        });
    }

    warn!("Multipart upload without a file field");
    Err(DetectError::MissingFile)
}

/// Acumula el campo por trozos y corta en cuanto supera `limit`.
async fn read_field(mut field: Field<'_>, limit: Option<usize>) -> DetectResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(read_failure)? {
        bytes.extend_from_slice(&chunk);
        if let Some(max) = limit.filter(|max| bytes.len() > *max) {
            warn!(limit = max, "Upload exceeds size limit");
            return Err(DetectError::PayloadTooLarge);
        }
    }
    Ok(bytes)
}

fn read_failure(err: MultipartError) -> DetectError {
    error!(error = %err, "Failed reading upload body");
    DetectError::InferenceFailed(err.body_text())
}
