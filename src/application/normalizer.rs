use crate::domain::detection::{ClassNames, Detection, RawDetection};
use crate::domain::errors::{DetectError, DetectResult};

/// Etiqueta de dominio para el nombre de clase "0".
pub const POTHOLE_LABEL: &str = "pothole";

/// Convierte la salida cruda del modelo al esquema de respuesta.
/// Mantiene el orden de emisión; no filtra, ordena ni fusiona cajas.
pub fn normalize(raw: Vec<RawDetection>, names: &ClassNames) -> DetectResult<Vec<Detection>> {
    raw.into_iter()
        .map(|det| {
            let name = names.get(det.class_id).ok_or_else(|| {
                DetectError::InferenceFailed(format!(
                    "class index {} missing from model names ({:?} known)",
                    det.class_id,
                    names.known_count()
                ))
            })?;

            Ok(Detection {
                label: rewrite_label(&name),
                confidence: det.confidence,
                bbox: det.bbox,
            })
        })
        .collect()
}

// Se compara el nombre resuelto, no el índice de clase.
fn rewrite_label(name: &str) -> String {
    if name == "0" {
        POTHOLE_LABEL.to_string()
    } else {
        name.to_string()
    }
}
