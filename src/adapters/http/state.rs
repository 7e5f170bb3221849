use std::sync::Arc;
use crate::application::services::DetectionService;

/// Estado compartido para los manejadores HTTP de Axum.
/// Se construye una vez en el arranque; el modelo y la credencial viven dentro
/// del servicio y son de solo lectura.
#[derive(Clone)]
pub struct HttpState {
    /// Pipeline de detección (autenticación, decodificación, inferencia).
    pub detection: Arc<DetectionService>,
    /// Tamaño máximo del archivo subido; se comprueba después de autenticar.
    pub max_body_size: Option<usize>,
}
