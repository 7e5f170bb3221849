use thiserror::Error;

use crate::domain::model::{Device, UnknownDevice};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API_KEY environment variable is required for authentication.")]
    MissingApiKey,
    #[error("YOLO_DEVICE inválido: {0}")]
    InvalidDevice(#[from] UnknownDevice),
    #[error("{name} inválido: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Configuración del proceso, leída una sola vez al arrancar.
#[derive(Clone)]
pub struct AppConfig {
    /// Secreto exigido en la cabecera `x-api-key`.
    pub api_key: String,
    /// Verbosidad de los logs (`LOG_LEVEL`), p. ej. "INFO".
    pub log_level: String,
    /// Logs en JSON en lugar de texto.
    pub log_json: bool,
    /// Ruta de los pesos ONNX.
    pub model_path: String,
    /// Dispositivo pedido para la inferencia.
    pub device: Device,
    pub host: String,
    pub port: u16,
    /// Tamaño máximo del archivo subido en bytes; `None` = sin límite.
    pub max_body_size: Option<usize>,
}

impl AppConfig {
    /// Lee la configuración de las variables de entorno.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("API_KEY")
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let device: Device = match lookup("YOLO_DEVICE") {
            Some(raw) => raw.parse::<Device>()?,
            None => Device::Cuda(0),
        };

        Ok(Self {
            api_key,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()).to_uppercase(),
            log_json: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            model_path: lookup("MODEL_PATH").unwrap_or_else(|| "yolov10s.onnx".to_string()),
            device,
            host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_number(&lookup, "API_PORT", 8000)?,
            max_body_size: match lookup("MAX_BODY_SIZE") {
                Some(_) => Some(parse_number(&lookup, "MAX_BODY_SIZE", 0)?),
                None => None,
            },
        })
    }
}

impl AppConfig {
    /// Traduce `LOG_LEVEL` (nombres estilo `logging` de Python incluidos) a
    /// una directiva de `EnvFilter`.
    pub fn log_directive(&self) -> String {
        match self.log_level.as_str() {
            "WARNING" | "WARN" => "warn".to_string(),
            "CRITICAL" | "FATAL" | "ERROR" => "error".to_string(),
            other => other.to_lowercase(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("model_path", &self.model_path)
            .field("device", &self.device)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

fn parse_number<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => match value.trim().parse() {
            Ok(n) => Ok(n),
            Err(_) => Err(ConfigError::InvalidNumber { name, value }),
        },
        None => Ok(default),
    }
}
