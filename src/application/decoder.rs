use image::RgbImage;
use tracing::warn;

use crate::domain::errors::{DetectError, DetectResult};

/// Decodifica los bytes subidos a RGB de 8 bits.
/// El formato se detecta por contenido; el alfa y los canales extra se descartan.
pub fn decode(bytes: &[u8]) -> DetectResult<RgbImage> {
    if bytes.is_empty() {
        warn!("Empty upload rejected");
        return Err(DetectError::EmptyFile);
    }

    let img = image::load_from_memory(bytes).map_err(|e| {
        warn!(error = %e, "Invalid image upload");
        DetectError::InvalidImage(e.to_string())
    })?;

    Ok(img.to_rgb8())
}
