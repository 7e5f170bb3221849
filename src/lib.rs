//! API HTTP de detección de objetos con YOLO sobre ONNX Runtime.
//!
//! Arquitectura hexagonal:
//! - `domain`: tipos y errores del dominio de detección
//! - `application`: casos de uso (autenticación, decodificación, normalización, pipeline)
//! - `adapters`: HTTP (Axum) y motor ONNX

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;

pub use config::AppConfig;
