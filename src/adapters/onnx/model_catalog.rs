use std::path::Path;
use tracing::warn;

use crate::domain::model::ModelId;

/// Comprobaciones previas sobre la ubicación de los pesos antes de cargarlos.
pub struct OnnxModelCatalog;

impl OnnxModelCatalog {
    pub fn new() -> Self { Self }

    pub fn validate_model(&self, model: &ModelId) -> anyhow::Result<()> {
        if model.onnx_path.trim().is_empty() {
            anyhow::bail!("onnx_path empty");
        }
        let path = Path::new(&model.onnx_path);
        if !path.is_file() {
            anyhow::bail!("model file not found: {}", model.onnx_path);
        }
        if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
            warn!(model = %model.onnx_path, "Model file does not have an .onnx extension");
        }
        Ok(())
    }
}

impl Default for OnnxModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        let err = OnnxModelCatalog::new().validate_model(&ModelId::from_path("  ")).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn rejects_missing_file() {
        let err = OnnxModelCatalog::new()
            .validate_model(&ModelId::from_path("/nonexistent/yolov10s.onnx"))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn rejects_directories() {
        let dir = env!("CARGO_MANIFEST_DIR");
        assert!(OnnxModelCatalog::new().validate_model(&ModelId::from_path(dir)).is_err());
    }

    #[test]
    fn accepts_existing_file() {
        let manifest = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        assert!(OnnxModelCatalog::new().validate_model(&ModelId::from_path(manifest)).is_ok());
    }
}
