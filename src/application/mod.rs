pub mod auth;
pub mod decoder;
pub mod dto;
pub mod normalizer;
pub mod ports;
pub mod services;
