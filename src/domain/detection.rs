use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Salida cruda del modelo, ya con forma fija.
/// `bbox` = [x1, y1, x2, y2] en píxeles de la imagen decodificada.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

/// Detección tal como se devuelve al cliente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub detections: Vec<Detection>,
    pub duration_ms: f64,
}

/// Mapa índice de clase -> nombre, propiedad del modelo cargado.
/// `Numeric` se usa cuando el modelo no trae nombres: cada índice se nombra
/// con su cadena decimal ("0", "1", ...).
#[derive(Debug, Clone, PartialEq)]
pub enum ClassNames {
    Named(BTreeMap<usize, String>),
    Numeric,
}

impl ClassNames {
    pub fn new(names: BTreeMap<usize, String>) -> Self {
        ClassNames::Named(names)
    }

    pub fn get(&self, class_id: usize) -> Option<Cow<'_, str>> {
        match self {
            ClassNames::Named(names) => names.get(&class_id).map(|n| Cow::Borrowed(n.as_str())),
            ClassNames::Numeric => Some(Cow::Owned(class_id.to_string())),
        }
    }

    /// Número de nombres conocidos; `None` si el mapa es numérico.
    pub fn known_count(&self) -> Option<usize> {
        match self {
            ClassNames::Named(names) => Some(names.len()),
            ClassNames::Numeric => None,
        }
    }

    /// Interpreta el metadato `names` que Ultralytics escribe en el ONNX,
    /// un dict de Python como `{0: 'pothole', 1: 'crack'}`.
    pub fn parse_ultralytics(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
        let mut names = BTreeMap::new();
        let mut rest = body.trim();

        while !rest.is_empty() {
            let (key, after_key) = rest.split_once(':')?;
            let idx: usize = key.trim().parse().ok()?;

            let after_key = after_key.trim_start();
            let quote = after_key.chars().next().filter(|c| *c == '\'' || *c == '"')?;
            let value_and_rest = &after_key[1..];
            let end = value_and_rest.find(quote)?;
            names.insert(idx, value_and_rest[..end].to_string());

            rest = value_and_rest[end + 1..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }

        Some(ClassNames::Named(names))
    }
}
