use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use yolo_detect_api::{
    adapters::{
        http::{router, state::HttpState},
        onnx::{model_catalog::OnnxModelCatalog, yolo_engine::OnnxYoloEngine},
    },
    application::{auth::Authenticator, services::DetectionService},
    domain::model::ModelId,
    AppConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Variables de entorno (.env opcional) y configuración.
    // Sin API_KEY el proceso no arranca.
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // 2. Inicializar logs según LOG_LEVEL / LOG_FORMAT
    init_tracing(&config)?;
    info!("🔧 Inicializando adaptadores de infraestructura...");

    // 3. Cargar el modelo (validando antes la ruta de los pesos)
    let model = ModelId::from_path(&config.model_path);
    OnnxModelCatalog::new().validate_model(&model)?;
    let engine = OnnxYoloEngine::load(&model, config.device)
        .with_context(|| format!("no se pudo cargar el modelo {}", model.onnx_path))?;
    info!(model = %model.name, device = %engine.device(), "Modelo listo");

    // 4. Servicio de detección y estado HTTP
    let detection = DetectionService::new(Arc::new(engine), Authenticator::new(config.api_key.clone()));
    let state = HttpState {
        detection: Arc::new(detection),
        max_body_size: config.max_body_size,
    };
    let app = router(state);

    // 5. Lanzar el servidor
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("dirección inválida {}:{}", config.host, config.port))?;

    info!("🚀 Servidor YOLO iniciado en http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Servidor detenido");
    Ok(())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    // RUST_LOG tiene prioridad; si no, se usa LOG_LEVEL
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_directive())
            .with_context(|| format!("LOG_LEVEL inválido: {}", config.log_level))?,
    };

    if config.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "No se pudo instalar el manejador de CTRL+C");
        std::future::pending::<()>().await;
    }
    info!("Señal de apagado recibida");
}
