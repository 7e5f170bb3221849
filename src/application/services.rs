use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::{
    application::{auth::Authenticator, decoder, normalizer, ports::DetectorPort},
    domain::{
        detection::{Detection, DetectionResponse},
        errors::DetectResult,
        model::YoloParams,
        upload::UploadedImage,
    },
};

/// Orquestador de una petición de detección:
/// autenticación, decodificación, inferencia y normalización.
#[derive(Clone)]
pub struct DetectionService {
    detector: Arc<dyn DetectorPort>,
    auth: Authenticator,
    params: YoloParams,
}

impl DetectionService {
    pub fn new(detector: Arc<dyn DetectorPort>, auth: Authenticator) -> Self {
        Self {
            detector,
            auth,
            params: YoloParams::default(),
        }
    }

    pub fn authenticate(&self, presented: Option<&str>) -> DetectResult<()> {
        self.auth.check(presented)
    }

    /// Ejecuta el pipeline sobre un archivo ya leído.
    /// `started` marca el inicio de la lectura del cuerpo.
    pub async fn detect(&self, upload: UploadedImage, started: Instant) -> DetectResult<DetectionResponse> {
        info!(
            filename = ?upload.filename,
            size = upload.bytes.len(),
            content_type = ?upload.content_type,
            "Received file"
        );

        let image = decoder::decode(&upload.bytes)?;

        let detections = self
            .infer(image)
            .await
            .inspect_err(|e| error!(error = %e, "Detection failed"))?;

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            count = detections.len(),
            conf_threshold = self.params.conf_threshold,
            input_size = self.params.input_size,
            duration_ms = %format!("{duration_ms:.1}"),
            "Completed detection"
        );

        Ok(DetectionResponse { detections, duration_ms })
    }

    async fn infer(&self, image: RgbImage) -> DetectResult<Vec<Detection>> {
        let raw = self.detector.predict(image, &self.params).await?;
        normalizer::normalize(raw, self.detector.class_names())
    }
}
