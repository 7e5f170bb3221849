use async_trait::async_trait;
use image::RgbImage;

use crate::domain::detection::{ClassNames, RawDetection};
use crate::domain::model::YoloParams;

/// Capacidad de inferencia consumida por el pipeline.
/// La implementación debe serializar internamente si el backend no admite
/// llamadas concurrentes.
#[async_trait]
pub trait DetectorPort: Send + Sync {
    async fn predict(&self, image: RgbImage, params: &YoloParams) -> anyhow::Result<Vec<RawDetection>>;
    fn class_names(&self) -> &ClassNames;
}
