use tracing::warn;

use crate::domain::errors::{DetectError, DetectResult};

/// Cabecera fija con la credencial del cliente.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Valida la credencial presentada contra el secreto configurado.
#[derive(Clone)]
pub struct Authenticator {
    secret: String,
}

impl Authenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn check(&self, presented: Option<&str>) -> DetectResult<()> {
        match presented {
            Some(key) if key.as_bytes() == self.secret.as_bytes() => Ok(()),
            _ => {
                // Nunca se registra el valor presentado ni el esperado
                warn!(present = presented.is_some(), "Authentication failed for request");
                Err(DetectError::InvalidApiKey)
            }
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").field("secret", &"<redacted>").finish()
    }
}
