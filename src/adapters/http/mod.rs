pub mod error;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::adapters::http::state::HttpState;

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/detect", post(routes::detect))
        .route("/health", get(routes::health))
        // Sin el límite de axum (2 MB); el tamaño del archivo lo controla `detect`
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        // Cualquier origen, método y cabecera, con credenciales
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}
