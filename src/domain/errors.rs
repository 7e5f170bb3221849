use thiserror::Error;

/// Errores tipados del pipeline de detección.
/// Cada variante tiene un código estable que es lo único que ve el cliente.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("API key ausente o incorrecta")]
    InvalidApiKey,
    #[error("Archivo vacío")]
    EmptyFile,
    #[error("Imagen inválida: {0}")]
    InvalidImage(String),
    #[error("Falta el campo de archivo en el formulario")]
    MissingFile,
    #[error("El archivo supera el tamaño máximo")]
    PayloadTooLarge,
    #[error("Fallo de inferencia: {0}")]
    InferenceFailed(String),
}

impl DetectError {
    pub fn code(&self) -> &'static str {
        match self {
            DetectError::InvalidApiKey => "invalid_api_key",
            DetectError::EmptyFile => "empty_file",
            DetectError::InvalidImage(_) => "invalid_image",
            DetectError::MissingFile => "missing_file",
            DetectError::PayloadTooLarge => "file_too_large",
            DetectError::InferenceFailed(_) => "inference_failed",
        }
    }
}

impl From<anyhow::Error> for DetectError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} conserva la cadena de causas para el log del servidor
        DetectError::InferenceFailed(format!("{err:#}"))
    }
}

pub type DetectResult<T> = Result<T, DetectError>;
